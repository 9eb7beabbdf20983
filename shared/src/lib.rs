pub mod comparators;
pub mod geo_point;
pub mod id;
pub mod runtime_parameters;
pub mod terms;
pub mod triple;
pub mod variable;
pub mod vocabulary;
