pub mod driver;
pub mod price;
pub mod publisher;
pub mod reconcile;
pub mod retry;
pub mod transport;

pub use driver::{PipelineDriver, RunSummary, Stage};
pub use publisher::SheetPublisher;
pub use reconcile::reconcile;
pub use transport::HttpTransport;
