// Persistence boundaries: the durable parameters file and the per-request session store.

pub mod session_store;
pub mod writer;
