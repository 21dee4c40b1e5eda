pub mod basis;
pub mod constants;
pub mod elliptic;
pub mod engine;
pub mod flux_errors;
pub mod map;
pub mod multiprecision;
pub mod occultation;
pub mod ops;
pub mod params;
pub mod rotation;
pub mod scalar;
pub mod special;

#[cfg(test)]
pub(crate) mod unit_test_global {
    use std::sync::LazyLock;

    use crate::{engine::FluxEngine, multiprecision::ShadowValidator, params::EngineParams};

    pub(crate) static ENGINE_L3: LazyLock<FluxEngine<f64>> =
        LazyLock::new(|| FluxEngine::with_lmax(3).expect("degree-3 engine"));

    pub(crate) static SHADOW_L2: LazyLock<ShadowValidator> = LazyLock::new(|| {
        let params = EngineParams::builder()
            .lmax(2)
            .build()
            .expect("degree-2 parameters");
        ShadowValidator::new(params).expect("degree-2 shadow validator")
    });
}
