pub(crate) mod build;
pub(crate) mod dep_graph;
pub(crate) mod generate;
pub(crate) mod ls_files;
