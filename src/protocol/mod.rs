//! Wire protocol

pub mod frame;

pub use frame::{
    decode, encode, is_valid, recover_request_id, Message, Response, RESPONSE_TYPE,
    UNKNOWN_REQUEST_ID,
};
