pub mod common;
pub mod config;
pub mod deconv;
pub mod downsample;
pub mod error;
pub mod model;
pub mod nmf;
pub mod profile;
pub mod reference;
pub mod scale;
pub mod simulate;

pub use config::DeconvConfig;
pub use deconv::{deconvolve_spots, DeconvResult, DeconvolutionRow};
pub use error::{DeconvError, Result};
pub use model::{train_model, TrainedModel};
pub use nmf::NmfMethod;
pub use reference::{MarkerGenes, ReferenceDataset, SpotMatrix, SpotMixtureVector};
pub use scale::Transform;
