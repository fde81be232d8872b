use wfcore::{NdArray, NodeContext, NodeError, Value};

/// Reads a numeric input as an array; scalars become one-element arrays.
pub(crate) fn require_array(ctx: &NodeContext, name: &str) -> Result<NdArray, NodeError> {
    let value = ctx.require_input(name)?;
    to_array(value).ok_or_else(|| NodeError::InvalidInputType {
        field: name.to_string(),
        expected: "ndarray".to_string(),
        actual: value.kind().to_string(),
    })
}

pub(crate) fn to_array(value: &Value) -> Option<NdArray> {
    match value {
        Value::NdArray(array) => Some(array.clone()),
        Value::Number(n) => Some(NdArray::from_vec(vec![*n])),
        Value::Array(items) => items
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<f64>>>()
            .map(NdArray::from_vec),
        _ => None,
    }
}

/// Element-wise sum; numbers add as scalars, arrays must share a shape.
pub(crate) fn add_values(total: &Value, next: &Value) -> Result<Value, NodeError> {
    match (total, next) {
        (Value::Null, v) => Ok(v.clone()),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::NdArray(a), Value::NdArray(b)) if a.shape == b.shape => {
            let data = a.data.iter().zip(&b.data).map(|(x, y)| x + y).collect();
            Ok(Value::NdArray(NdArray {
                shape: a.shape.clone(),
                data,
            }))
        }
        (a, b) => Err(NodeError::InvalidInputType {
            field: "frames".to_string(),
            expected: a.kind().to_string(),
            actual: b.kind().to_string(),
        }),
    }
}

/// Reads a whole-number input that sizes an allocation or a loop. Values
/// outside the input's declared bounds are rejected rather than clamped.
pub(crate) fn require_count(ctx: &NodeContext, name: &str) -> Result<usize, NodeError> {
    let value = ctx.require_number(name)?;
    let within = ctx
        .params
        .input(name)
        .map_or(true, |input| input.in_bounds(&Value::Number(value)));
    if !value.is_finite() || !within {
        return Err(NodeError::Configuration(format!(
            "{} = {} is outside its declared bounds",
            name, value
        )));
    }
    Ok(value.round().max(0.0) as usize)
}
