use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error(
        "Refusing to run: {repo} has uncommitted changes.\n\
         Commit or stash first so worker clones have a clean base."
    )]
    DirtyWorkspace { repo: String },

    #[error("Clone failed for {dest}: {detail}")]
    CloneFailed { dest: String, detail: String },

    #[error("Failed applying patch {patch}.\nam error:\n{am_error}\napply error:\n{apply_error}")]
    PatchApply {
        patch: String,
        am_error: String,
        apply_error: String,
    },

    #[error("No JSON object found in agent output")]
    NoJsonObject,

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Semaphore closed: {0}")]
    Semaphore(String),
}

pub type Result<T> = std::result::Result<T, Error>;
