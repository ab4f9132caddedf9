pub mod event;
pub mod request_params;
