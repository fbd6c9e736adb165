//! Message kind tags.
//!
//! Every frame is a two-element array `[kind, {fields}]`. Kinds 0x20-0x2d are
//! the ones a Pkl server speaks; anything else is rejected per record.

/// Host → server: create an evaluator.
pub const CREATE_EVALUATOR: u64 = 0x20;

/// Server → host: evaluator id or error.
pub const CREATE_EVALUATOR_RESPONSE: u64 = 0x21;

/// Host → server: release an evaluator. Fire-and-forget.
pub const CLOSE_EVALUATOR: u64 = 0x22;

/// Host → server: evaluate a module or expression.
pub const EVALUATE: u64 = 0x23;

/// Server → host: result bytes or error.
pub const EVALUATE_RESPONSE: u64 = 0x24;

/// Server → host: evaluator log line. Fire-and-forget.
pub const LOG: u64 = 0x25;

pub const READ_RESOURCE: u64 = 0x26;
pub const READ_RESOURCE_RESPONSE: u64 = 0x27;
pub const READ_MODULE: u64 = 0x28;
pub const READ_MODULE_RESPONSE: u64 = 0x29;
pub const LIST_RESOURCES: u64 = 0x2a;
pub const LIST_RESOURCES_RESPONSE: u64 = 0x2b;
pub const LIST_MODULES: u64 = 0x2c;
pub const LIST_MODULES_RESPONSE: u64 = 0x2d;

/// Returns a human-readable name for a message kind.
pub fn code_name(code: u64) -> &'static str {
    match code {
        CREATE_EVALUATOR => "CreateEvaluator",
        CREATE_EVALUATOR_RESPONSE => "CreateEvaluatorResponse",
        CLOSE_EVALUATOR => "CloseEvaluator",
        EVALUATE => "Evaluate",
        EVALUATE_RESPONSE => "EvaluateResponse",
        LOG => "Log",
        READ_RESOURCE => "ReadResource",
        READ_RESOURCE_RESPONSE => "ReadResourceResponse",
        READ_MODULE => "ReadModule",
        READ_MODULE_RESPONSE => "ReadModuleResponse",
        LIST_RESOURCES => "ListResources",
        LIST_RESOURCES_RESPONSE => "ListResourcesResponse",
        LIST_MODULES => "ListModules",
        LIST_MODULES_RESPONSE => "ListModulesResponse",
        _ => "Unknown",
    }
}

/// Returns true for kinds the server sends to the host.
pub fn is_incoming(code: u64) -> bool {
    matches!(
        code,
        CREATE_EVALUATOR_RESPONSE
            | EVALUATE_RESPONSE
            | LOG
            | READ_RESOURCE
            | READ_MODULE
            | LIST_RESOURCES
            | LIST_MODULES
    )
}
