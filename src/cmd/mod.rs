//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `serve`         | `Serve`                                            |
//! | `project`       | `Init`                                             |
//! | `prospects`     | `Add`, `List`, `Move`, `History`, `Stats`          |
//! | `config`        | `Config`                                           |

pub mod config;
pub mod project;
pub mod prospects;
pub mod serve;

pub use config::cmd_config;
pub use project::cmd_init;
pub use prospects::{cmd_add, cmd_history, cmd_list, cmd_move, cmd_stats};
pub use serve::cmd_serve;
