use crate::array::{require_array, require_count, to_array};
use async_trait::async_trait;
use std::sync::Arc;
use wfcore::{
    Input, NdArray, NodeContext, NodeError, Output, ProcessingPlugin, Signature, ValueKind,
};
use wfruntime::{PluginFactory, PluginMetadata};

/// Azimuthal average of an image around its centre.
///
/// Samples where `mask` is zero are ignored. Without `data` the mask itself
/// is integrated, which yields the masked fraction per radial bin.
pub struct IntegrateNode;

#[async_trait]
impl ProcessingPlugin for IntegrateNode {
    fn node_type(&self) -> &str {
        "Integrate"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input(
                "mask",
                Input::default()
                    .describe("Pixels to include")
                    .with_kind(ValueKind::NdArray),
            )
            .input("data", Input::default().describe("Image to integrate"))
            .input(
                "bins",
                Input::default()
                    .describe("Number of radial bins")
                    .with_default(16.0)
                    .with_bounds(1.0, 4096.0),
            )
            .output(
                "q",
                Output::default()
                    .describe("Radial bin centres")
                    .with_unit("px")
                    .with_kind(ValueKind::NdArray),
            )
            .output(
                "I",
                Output::default()
                    .describe("Mean intensity per bin")
                    .with_kind(ValueKind::NdArray),
            )
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let mask = require_array(ctx, "mask")?;
        let data = match ctx.input("data").filter(|v| !v.is_null()) {
            Some(value) => to_array(value).ok_or_else(|| NodeError::InvalidInputType {
                field: "data".to_string(),
                expected: "ndarray".to_string(),
                actual: value.kind().to_string(),
            })?,
            None => mask.clone(),
        };
        if data.len() != mask.len() {
            return Err(NodeError::ExecutionFailed(format!(
                "mask has {} samples but data has {}",
                mask.len(),
                data.len()
            )));
        }
        let bins = require_count(ctx, "bins")?.max(1);

        let (q, intensity) = radial_profile(&mask, &data, bins)?;
        ctx.set_output("q", q)?;
        ctx.set_output("I", intensity)
    }
}

fn radial_profile(
    mask: &NdArray,
    data: &NdArray,
    bins: usize,
) -> Result<(NdArray, NdArray), NodeError> {
    if !mask.is_consistent() {
        return Err(NodeError::ExecutionFailed(format!(
            "mask shape {:?} does not match its {} samples",
            mask.shape,
            mask.len()
        )));
    }
    let (rows, cols) = match mask.shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        _ => (1, mask.len()),
    };
    let centre = ((rows as f64 - 1.0) / 2.0, (cols as f64 - 1.0) / 2.0);
    let radius = |index: usize| {
        let (r, c) = ((index / cols) as f64, (index % cols) as f64);
        ((r - centre.0).powi(2) + (c - centre.1).powi(2)).sqrt()
    };
    let max_radius = (0..mask.len()).map(radius).fold(0.0_f64, f64::max);
    let width = if max_radius > 0.0 {
        max_radius / bins as f64
    } else {
        1.0
    };

    let mut sums = vec![0.0; bins];
    let mut counts = vec![0usize; bins];
    for (index, (m, value)) in mask.data.iter().zip(&data.data).enumerate() {
        if *m == 0.0 {
            continue;
        }
        let bin = ((radius(index) / width) as usize).min(bins - 1);
        sums[bin] += value;
        counts[bin] += 1;
    }

    let q = (0..bins).map(|b| (b as f64 + 0.5) * width).collect();
    let intensity = sums
        .iter()
        .zip(&counts)
        .map(|(sum, count)| if *count > 0 { sum / *count as f64 } else { 0.0 })
        .collect();
    Ok((NdArray::from_vec(q), NdArray::from_vec(intensity)))
}

pub struct IntegrateNodeFactory;

impl PluginFactory for IntegrateNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(IntegrateNode))
    }

    fn node_type(&self) -> &str {
        "Integrate"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Radially integrate a masked image".to_string(),
            category: "reduction".to_string(),
            ..PluginMetadata::default()
        }
    }
}
