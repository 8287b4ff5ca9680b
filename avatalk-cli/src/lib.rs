//! Building blocks of the `avatalk` binary: logging setup, the interactive
//! console, the one-shot `ask` command and the access token server.

pub mod ask;
pub mod console;
pub mod logging;
pub mod token_server;
