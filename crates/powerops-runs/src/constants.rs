//! Names shared with the compute service and the platform.

/// Event type of a run request.
pub const RUN_EVENT_TYPE: &str = "POWEROPS_PROCESS_REQUESTED";
pub const RUN_EVENT_SUBTYPE: &str = "SHOP";
pub const RUN_EVENT_SOURCE: &str = "PowerOps SDK";
/// Prefix of a run's external id, followed by a v4 uuid.
pub const RUN_EXTERNAL_ID_PREFIX: &str = "POWEROPS_SHOP_RUN";

pub const PROCESS_STARTED: &str = "POWEROPS_PROCESS_STARTED";
pub const PROCESS_FINISHED: &str = "POWEROPS_PROCESS_FINISHED";
pub const PROCESS_FAILED: &str = "POWEROPS_PROCESS_FAILED";

pub const LOG_FILE_LABEL: &str = "LOG_FILE";
pub const OBJECTIVE_SEQUENCE_LABEL: &str = "OBJECTIVE_SEQUENCE";
pub const PROCESS_EVENT_LABEL: &str = "PROCESS_EVENT";

pub const META_WATERCOURSE: &str = "shop:watercourse";
pub const META_STARTTIME: &str = "shop:starttime";
pub const META_ENDTIME: &str = "shop:endtime";
pub const META_TIMERESOLUTION: &str = "shop:timeresolution";
pub const META_MANUAL_RUN: &str = "shop:manual_run";
pub const META_RUN_EVENT_XID: &str = "shop:run_event_xid";
pub const META_FILE_TYPE: &str = "shop:file_type";
pub const META_PENALTY_BREAKDOWN: &str = "shop:penalty_breakdown";

pub const YAML_CONTENT_TYPE: &str = "application/yaml";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";
pub const OCTET_CONTENT_TYPE: &str = "application/octet-stream";

/// File name given to the uploaded case document.
pub const CASE_FILE_NAME: &str = "case.yaml";
