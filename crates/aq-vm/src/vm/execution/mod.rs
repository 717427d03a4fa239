//! Instruction execution handlers

mod arithmetic;
mod comparison;
mod control;
mod functions;
mod memory;
mod objects;
