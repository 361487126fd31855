//! Postgres wire protocol core.
//!
//! Everything in here is sans-io: [`Connection`] encodes frontend
//! messages into [`Bytes`][bytes::Bytes] and consumes backend bytes fed
//! into its receive buffer, the caller owns the transport.
//!
//! # Examples
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use std::net::TcpStream;
//!
//! use postwire::{Connection, Param, ResultFormat, StartupOptions};
//!
//! fn wait_ready(
//!     conn: &mut Connection,
//!     socket: &mut TcpStream,
//! ) -> Result<postwire::QueryOutcome, Box<dyn std::error::Error>> {
//!     loop {
//!         let buf = conn.get_buffer();
//!         let read = socket.read(buf)?;
//!         if let Some(outcome) = conn.buffer_updated(read)? {
//!             return Ok(outcome);
//!         }
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut socket = TcpStream::connect("localhost:5432")?;
//!     let mut conn = Connection::default();
//!
//!     let startup = conn.startup_message(StartupOptions {
//!         user: "postgres",
//!         ..Default::default()
//!     })?;
//!     socket.write_all(&startup)?;
//!     wait_ready(&mut conn, &mut socket)?;
//!
//!     let query = conn.execute(
//!         "SELECT $1::int4 + 1",
//!         &[Param::Int(41)],
//!         ResultFormat::Default,
//!         false,
//!     )?;
//!     socket.write_all(&query)?;
//!     let results = wait_ready(&mut conn, &mut socket)?.into_result()?;
//!     assert_eq!(results[0].rows()[0].get(0), Some(&postwire::Value::Int4(42)));
//!
//!     socket.write_all(&conn.terminate_message())?;
//!     Ok(())
//! }
//! ```

pub mod common;
mod ext;

// Protocol
pub mod protocol;
pub mod framer;

// Values
pub mod types;
pub mod encode;

// Component
mod statement;
pub mod result;

// Connection
pub mod connection;

mod error;

pub use common::ByteStr;
pub use connection::{Config, Connection, StartupOptions};
pub use encode::{Encoded, EncodeError, Param, ToSqlText};
pub use error::{Error, ErrorKind, Result};
pub use framer::{Frame, Framer};
pub use protocol::{Oid, PgFormat, ProtocolError, ResultFormat, ServerError, Severity};
pub use result::{FieldDescriptor, QueryOutcome, Row, StatementResult};
pub use types::{DecodeContext, DecodeError, Decoder, Value};
