use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("'{name}' is already registered")]
    DuplicateRegistration { name: String },

    #[error("Unknown command keyword '{keyword}'")]
    UnknownCommand { keyword: String },

    #[error("Command string is missing")]
    MissingCommand,

    #[error("Missing arguments")]
    MissingArguments,

    #[error("Expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Invalid integer argument '{value}'")]
    InvalidArgument { value: String },

    #[error("Atom offset {offset} outside structure of {len} atoms")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("Structure atom range is empty")]
    EmptyStructure,

    #[error("Group '{group}' did not match any structures")]
    NoMatchingInstances { group: String },

    #[error("Unknown group '{name}'")]
    UnknownGroup { name: String },

    #[error("Group not found")]
    GroupNotFound,

    #[error("Property not found")]
    PropertyNotFound,
}
