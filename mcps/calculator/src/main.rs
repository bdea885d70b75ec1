//! `megatool-calculator`
//!
//! Run through the supervisor with `megatool run calculator`, or add it to
//! a client with `megatool install --client cursor calculator`.

use calculator::CalculatorServer;

mcp_common::serve_server!(CalculatorServer, "calculator");
