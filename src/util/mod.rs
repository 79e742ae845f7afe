//! Internal utilities shared by the queues, channel and scheduler.

pub(crate) mod take_cell;
pub(crate) mod xorshift;

pub(crate) use take_cell::TakeCell;
pub(crate) use xorshift::XorShift64;
