pub mod source_id;
