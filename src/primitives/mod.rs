pub mod mime;
pub mod path_resolver;
pub mod uri;
