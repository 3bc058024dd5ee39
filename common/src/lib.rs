pub mod amount;
pub mod config;
pub mod connector;
pub mod coordinator;
pub mod dag;
pub mod engine;
pub mod error;
pub mod executor;
pub mod mock;
pub mod pipeline;
pub mod results;
pub mod run;
pub mod sqlite;
pub mod task;

pub use amount::Amount;
pub use config::PipelineConfig;
pub use connector::{Bootstrap, CsvFileSource, Extract, Load, Source};
pub use coordinator::Coordinator;
pub use dag::{TaskGraph, TaskGraphBuilder};
pub use engine::{aggregate, AggregatedRecord, CleanRecord, SaleRecord};
pub use error::{ConnectorError, GraphError, TaskFailedError};
pub use pipeline::{PipelineService, RetailPipeline};
pub use results::{
    ApiError, ApiResponse, SalesMetrics, SalesRow, TriggerRequest, TriggerResponse,
};
pub use run::{RunId, RunReport, RunStatus, TaskReport};
pub use sqlite::{SinkMetrics, SqliteSink, SqliteSource};
pub use task::{RetryPolicy, Task, TaskId, TaskInputs, TaskResult, TaskStatus};
