//! Request programs, their interpreter and the QoS scheduler that runs them.

pub mod bridge;
pub mod cleanup;
pub mod context;
pub mod effect;
pub mod error;
pub mod qos;
pub mod route;
pub mod scheduler;
pub mod sensor;
pub mod step;
pub mod trampoline;
mod worker;

pub use bridge::{BodyReader, IoEvent, IoHandle, ReadProgress, ResponseWriter, WriteProgress};
pub use cleanup::{CleanerAction, CleanerHandle, CleanupChain};
pub use context::{ContextState, RequestContext};
pub use effect::{
    abort, add_cleaner, add_cookie, add_headers, continue_with, get_cookies, get_header, get_header_names,
    get_method, get_parameter, get_parameter_names, get_qos, invoke_cleaner, read_body, route_path, set_qos,
    Operation, PathMatcher,
};
pub use error::{AppResult, SchedulerError};
pub use qos::{FixedQos, HeaderQosClassifier, Qos, QosClassifier};
pub use route::{strip_segment_prefix, Router};
pub use scheduler::{Scheduler, SchedulerStats};
pub use sensor::{report, InMemorySensor, Sensor, SensorEvent, TracingSensor};
pub use step::{downcast, Step};
pub use trampoline::{run, Continuation, Routine, RunResult, Value};
