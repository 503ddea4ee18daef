//! Stateless foundations: molecular data models, the element mass table,
//! and pure geometry routines shared by the loader and the statistics
//! engine.

pub mod elements;
pub mod geometry;
pub mod models;
