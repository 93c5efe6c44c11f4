//! # outport-driver
//!
//! Typed operations on top of the outport transport.
//!
//! Producers use [`DriverFacade`] to marshal each operation's argument, tag it
//! with its [`OperationType`] inside a payload envelope, and send it through a
//! [`PayloadSender`] (a `WsClient` or `WsServer`). Consumers register an
//! [`OperationDispatcher`] as the transport's payload handler and route each
//! operation to an [`OperationHandler`].

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod errors;
pub mod facade;
pub mod marshal;
pub mod operation;
pub mod types;

pub use dispatcher::{OperationDispatcher, OperationHandler};
pub use errors::DriverError;
pub use facade::{DriverFacade, PayloadSender};
pub use marshal::{JsonMarshaler, PayloadMarshaler};
pub use operation::OperationType;
