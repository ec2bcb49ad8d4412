//! Equivariant network: radial embedding, radial MLP, tensor products,
//! geometric encoder and aggregator.

pub mod aggregator;
pub mod encoder;
pub mod mlp;
pub mod radial;
pub mod tensor_product;

pub use aggregator::{coordinate_change, AggregateGradients, AggregateTape, Aggregator};
pub use encoder::{EdgeFeatures, GeometricEncoder};
pub use mlp::{MlpTape, RadialNetwork};
pub use radial::RadialEmbedding;
pub use tensor_product::{TensorProduct, TensorProductGradients};
