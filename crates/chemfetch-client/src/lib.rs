pub mod admetlab;
pub mod encode;
pub mod http;
pub mod knapsack;
pub mod molsoft;
pub mod protox;

pub use admetlab::{AdmetLab, AdmetLabExtractor, AdmetLabFetcher};
pub use encode::{IdentityEncoder, StructureEncoder};
pub use http::HttpClient;
pub use knapsack::{Knapsack, KnapsackDetailExtractor, KnapsackDetailFetcher, SearchType};
pub use molsoft::{Molsoft, MolsoftExtractor, MolsoftFetcher};
pub use protox::{Protox, ProtoxExtractor, ProtoxFetcher};
