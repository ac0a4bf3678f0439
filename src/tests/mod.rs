//! Shared test doubles and router-level tests.


pub(crate) use fakes::*;
