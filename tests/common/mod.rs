#![allow(dead_code)]

pub mod assertions;
pub mod data;
pub mod providers;
