// Integration test suite for the infinite-canvas collaboration server.
//
// Covers the HTTP API surface. The WebSocket collaboration protocol itself
// is covered by the actor/state/registry unit tests in the library crate,
// since Rocket's local test client has no WebSocket support.

mod common;

mod retention;
mod rooms;
mod system;
