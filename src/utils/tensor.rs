//! Conversions between host arrays and tensors

use burn::tensor::{backend::Backend, Tensor, TensorData};
use ndarray::{Array2, Array3};

use crate::error::{Result, TcnError};

pub fn array3_to_tensor<B: Backend>(array: &Array3<f32>, device: &B::Device) -> Tensor<B, 3> {
    let (d0, d1, d2) = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::from_data(TensorData::new(data, [d0, d1, d2]), device)
}

pub fn array2_to_tensor<B: Backend>(array: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (d0, d1) = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::from_data(TensorData::new(data, [d0, d1]), device)
}

pub fn vec_to_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), device)
}

pub fn tensor3_to_array<B: Backend>(tensor: Tensor<B, 3>) -> Result<Array3<f32>> {
    let dims = tensor.dims();
    let values: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| TcnError::ShapeMismatch {
            context: "tensor readback".to_string(),
            detail: format!("{e:?}"),
        })?;
    Array3::from_shape_vec((dims[0], dims[1], dims[2]), values).map_err(|e| {
        TcnError::ShapeMismatch {
            context: "tensor readback".to_string(),
            detail: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_layout_is_preserved() {
        let array = Array3::from_shape_fn((2, 3, 4), |(a, b, c)| (a * 100 + b * 10 + c) as f32);
        let tensor = array3_to_tensor::<TestBackend>(&array, &Default::default());
        assert_eq!(tensor.dims(), [2, 3, 4]);
        assert_eq!(tensor3_to_array(tensor).unwrap(), array);
    }

    #[test]
    fn test_array2() {
        let array = Array2::from_shape_fn((2, 3), |(a, b)| (a * 3 + b) as f32);
        let tensor = array2_to_tensor::<TestBackend>(&array, &Default::default());
        let values: Vec<f32> = tensor.into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
