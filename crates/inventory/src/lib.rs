//! Inventory domain module.
//!
//! Stock lives on the variant row; every change to it is recorded as an
//! inventory movement. This crate holds the movement model and the stock
//! arithmetic, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod movement;

pub use movement::{
    InventoryMovement, MovementDraft, MovementFilter, MovementReason, MovementView, apply_to_stock,
    sale_movement,
};
