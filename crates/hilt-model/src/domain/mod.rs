mod kv;
pub use kv::KeyValue;

mod task_id;
pub use task_id::TaskId;

mod task_info;
pub use task_info::TaskInfo;

mod task_status;
pub use task_status::TaskStatus;

mod step;
pub use step::StepRecord;

/// Name of a hardware module declared in the module configuration.
pub type ModuleName = String;

/// Name under which a test body is registered on the host.
pub type FuncName = String;
