use super::{Activation, MlpConfig};
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{Init, Linear, Module, VarBuilder};

/// Xavier (Glorot) uniform initialization of a `(fan_out, fan_in)` weight.
fn xavier_uniform(fan_in: usize, fan_out: usize) -> Init {
    let b = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Init::Uniform { lo: -b, up: b }
}

fn linear(in_dim: usize, out_dim: usize, w: Init, b: Init, vb: VarBuilder) -> Result<Linear> {
    let ws = vb.get_with_hints((out_dim, in_dim), "weight", w)?;
    let bs = vb.get_with_hints(out_dim, "bias", b)?;
    Ok(Linear::new(ws, Some(bs)))
}

/// Returns vector of linear modules from [`MlpConfig`].
fn create_linear_layers(prefix: &str, vs: VarBuilder, config: &MlpConfig) -> Result<Vec<Linear>> {
    let mut dims = vec![config.in_dim];
    dims.extend(config.units.iter());
    dims.push(config.out_dim);
    let n_layers = dims.len() - 1;
    let vs = vs.pp(prefix);

    (0..n_layers)
        .map(|i| {
            let (in_dim, out_dim) = (dims[i], dims[i + 1]);
            let vs = vs.pp(format!("ln{}", i));
            if i == n_layers - 1 && config.small_head {
                let w = Init::Randn {
                    mean: 0.0,
                    stdev: 0.01,
                };
                linear(in_dim, out_dim, w, Init::Const(0.01), vs)
            } else {
                linear(in_dim, out_dim, xavier_uniform(in_dim, out_dim), Init::Const(0.), vs)
            }
        })
        .collect()
}

/// Multilayer perceptron with a linear output layer.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    layers: Vec<Linear>,
}

impl Mlp {
    fn activate(&self, xs: Tensor) -> Result<Tensor> {
        Ok(match self.config.activation {
            Activation::Relu => xs.relu()?,
            Activation::Tanh => xs.tanh()?,
        })
    }
}

impl SubModel1 for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        let mut xs = xs.to_device(&self.device)?;
        let n_layers = self.layers.len();

        for layer in self.layers[..n_layers - 1].iter() {
            xs = self.activate(layer.forward(&xs)?)?;
        }

        Ok(self.layers[n_layers - 1].forward(&xs)?)
    }

    fn build(vs: VarBuilder, config: Self::Config) -> Result<Self> {
        let device = vs.device().clone();
        let layers = create_linear_layers("mlp", vs, &config)?;

        Ok(Mlp {
            config,
            device,
            layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_mlp_shapes_and_head_init() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = MlpConfig::new(4, vec![8, 8], 3)
            .activation(Activation::Tanh)
            .small_head(true);
        let mlp = Mlp::build(vb, config)?;

        let xs = Tensor::ones((5, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(mlp.forward(&xs)?.dims(), &[5, 3]);

        let data = varmap.data().lock().unwrap();
        assert_eq!(data.len(), 6);
        let bias: Vec<f32> = data["mlp.ln2.bias"].as_tensor().to_vec1()?;
        assert_eq!(bias, vec![0.01; 3]);
        let bias: Vec<f32> = data["mlp.ln0.bias"].as_tensor().to_vec1()?;
        assert_eq!(bias, vec![0.0; 8]);
        let bound = (6.0f32 / 12.0).sqrt();
        let w: Vec<Vec<f32>> = data["mlp.ln0.weight"].as_tensor().to_vec2()?;
        assert!(w.iter().flatten().all(|x| x.abs() <= bound));
        Ok(())
    }
}
