// Business domains
pub mod captures;
