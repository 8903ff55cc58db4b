pub mod match_api;
pub mod match_structs;
pub mod response_mapping;
