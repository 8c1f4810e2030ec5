//! Names shared across the provlane crates

/// Event type that opens a session
pub const TASK_START: &str = "task_start";

/// Event type for one agent action step
pub const ACTION: &str = "action";

/// Event type that closes a session
pub const SESSION_END: &str = "session_end";

/// Tool name used when a recorded call carries none
pub const DEFAULT_TOOL_NAME: &str = "tool_call";

/// Code-executing tool that gets no shared tool node in the graph
pub const PYTHON_INTERPRETER: &str = "python_interpreter";

/// Default display cap for observation text, in characters
pub const DEFAULT_OBSERVATION_DISPLAY_CAP: usize = 2000;
