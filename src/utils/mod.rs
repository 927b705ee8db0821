// src/utils/mod.rs
pub mod formatting;
pub mod id_generator;
pub mod markup;
