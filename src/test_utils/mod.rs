#![allow(missing_docs)]

pub(crate) mod http;
pub(crate) mod server;

pub(crate) use http::{assert_error, response_data};
pub(crate) use server::{
    get_test_server, get_test_server_with_state, get_unconfigured_test_server, log_in_test_user,
    register_test_user, signed_in_user,
};
