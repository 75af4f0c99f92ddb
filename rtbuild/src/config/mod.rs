mod context_desc;

pub use context_desc::RtasContextDesc;
