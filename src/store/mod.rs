//! Persistence collaborators: the submission sheet and portfolio files.

pub mod portfolio;
pub mod sheet;
pub mod traits;

pub use portfolio::LocalPortfolioStore;
pub use sheet::CsvSheet;
pub use traits::{PortfolioStore, SubmissionSink};
