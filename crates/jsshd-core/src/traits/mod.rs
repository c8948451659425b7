//! Core trait definitions

mod directory;
mod logging;
mod process;

pub use directory::IdentityDirectory;
pub use logging::{LogManager, LogWriter};
pub use process::{
    ChildProcess, ProcessExit, ProcessSpawner, SpawnRequest, SpawnedProcess, StdinWriter,
    StdoutReader, TerminalControl,
};
