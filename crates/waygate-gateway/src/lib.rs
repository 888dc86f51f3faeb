// SPDX-License-Identifier: Apache-2.0
//! The gateway dispatch table and its HTTP+JSON carrier.
mod dispatch;
mod http;
mod methods;

pub use dispatch::{DispatchError, Dispatcher};
pub use http::build_router;
pub use methods::{register_methods, GatewayState};
