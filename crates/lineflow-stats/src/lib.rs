//! Small statistics toolbox shared by the Lineflow crates.
//!
//! - [`descriptive`]: summary statistics (mean, spread, extrema) of reward and episode-length samples
//! - [`window`]: fixed-capacity sliding window that evicts its oldest entry first
//!
//! # Examples
//!
//! ## Summarizing episode rewards
//!
//! ```
//! use lineflow_stats::descriptive::DescriptiveStats;
//!
//! let rewards = [110.0, 120.0, 130.0];
//! let stats = DescriptiveStats::new(rewards).unwrap();
//! assert_eq!(stats.mean, 120.0);
//! assert_eq!(stats.count, 3);
//! ```
//!
//! ## Keeping the latest samples
//!
//! ```
//! use lineflow_stats::window::RollingWindow;
//!
//! let mut window = RollingWindow::new(2);
//! window.push(1.0);
//! window.push(2.0);
//! window.push(3.0);
//! assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
//! ```

pub mod descriptive;
pub mod window;
