//! Sales domain module: customers, carts, orders and checkout.
//!
//! This crate contains business rules for the purchase flow, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod cart;
pub mod checkout;
pub mod customer;
pub mod order;

pub use cart::{Cart, CartItem, CartItemView, CartStatus, CartView};
pub use checkout::{CheckoutPlan, CheckoutRequest, LockedVariant, StockChange, plan_checkout};
pub use customer::{Customer, CustomerDraft, CustomerFilter, CustomerPatch};
pub use order::{
    Order, OrderFilter, OrderItem, OrderNumber, OrderPatch, OrderSort, OrderStatus, OrderView,
};
