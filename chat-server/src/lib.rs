pub mod config;
pub mod error;
pub mod llm;
pub mod markup;
pub mod routes;
#[cfg(test)]
mod test_support;
