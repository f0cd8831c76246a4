pub mod reorder_buffer;
pub mod ring_buffer;
