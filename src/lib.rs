//! Bitflux core library: deterministic bit-transformation strategies with
//! recorded, replay-verifiable executions.

#[path = "model/bits.rs"]
mod bits;
#[path = "model/command.rs"]
mod command;
#[path = "platform/config.rs"]
mod config;
#[path = "runtime/engine.rs"]
mod engine;
mod envinfo;
#[path = "platform/error.rs"]
mod error;
#[path = "platform/fsutil.rs"]
mod fsutil;
#[path = "runtime/interp.rs"]
mod interp;
#[path = "model/metrics.rs"]
mod metrics;
#[path = "model/ops.rs"]
mod ops;
#[path = "model/params.rs"]
mod params;
#[path = "runtime/parser.rs"]
mod parser;
#[path = "model/reporting.rs"]
mod reporting;
#[path = "model/result.rs"]
mod result;
#[path = "runtime/script.rs"]
mod script;
#[path = "runtime/verify.rs"]
mod verify;

pub use bits::*;
pub use command::*;
pub use config::*;
pub use engine::*;
pub use envinfo::*;
pub use error::*;
pub use fsutil::*;
pub use interp::*;
pub use metrics::*;
pub use ops::*;
pub use params::*;
pub use parser::*;
pub use reporting::*;
pub use result::*;
pub use script::*;
pub use verify::*;
