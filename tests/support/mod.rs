#![allow(dead_code)]

pub mod observations;
pub mod railcast_env;
