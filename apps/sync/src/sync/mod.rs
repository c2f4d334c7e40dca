// Incremental Airtable -> Postgres synchronization core.
// Pure steps (fields, transform, change_filter) do no I/O; everything that
// touches the network sits behind a trait so the orchestrator can be driven
// by fakes.

pub mod alert;
pub mod change_filter;
pub mod fields;
pub mod history;
pub mod orchestrator;
pub mod scheduler;
pub mod sink;
pub mod transform;
