pub mod term_buffer;
pub mod term_dict;
pub mod postings;
pub mod inverted;
