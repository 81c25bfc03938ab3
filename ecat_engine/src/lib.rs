//! Real-time cyclic PDO exchange engine.
//!
//! The engine owns the periodic process-data cycle (receive → publish
//! inputs → consume outputs → send) on a dedicated, optionally RT-scheduled
//! thread, and lets independently configured readers and writers come and
//! go dynamically without dropping frames or blocking the cycle.
//!
//! - [`engine`] - The [`Engine`](engine::Engine): cycle thread, seqlock
//!   input publication, output staging, and the reconfigure protocol
//! - [`reader`] - Blocking [`Reader`](reader::Reader) handles
//! - [`writer`] - [`Writer`](writer::Writer) handles and batched
//!   [`Transaction`](writer::Transaction)s
//! - [`codec`] - Pure bit/byte translation between typed values and PDO
//!   fields
//! - [`pool`] - Lazy `(interface, backend)` → engine mapping
//! - [`config`] - TOML-loadable engine configuration
//!
//! ```no_run
//! use ecat_common::breaker::{self, Breaker};
//! use ecat_common::telem::{DataType, Frame, Rate, Series};
//! use ecat_engine::engine::Engine;
//! use ecat_master::mock::MockMaster;
//! use ecat_master::pdo::PdoEntry;
//!
//! let engine = Engine::new(Box::new(MockMaster::new("eth0")));
//! let entry = PdoEntry::input(0, 0x6000, 1, 16, DataType::Int16);
//! let mut reader = engine.open_reader(vec![entry], Rate(1000.0))?;
//!
//! let breaker = Breaker::new(breaker::Config::default());
//! breaker.start();
//! let mut frame = Frame::new(vec![Series::new(DataType::Int16)]);
//! reader.read(&breaker, &mut frame)?;
//! # Ok::<(), ecat_common::error::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod engine;
pub mod pool;
pub mod reader;
pub mod writer;

pub use config::EngineConfig;
pub use engine::Engine;
pub use pool::Pool;
pub use reader::Reader;
pub use writer::{Transaction, Writer};
