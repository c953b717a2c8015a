#![allow(unsafe_op_in_unsafe_fn)]

use crate::{FormStamp, FormStampBuilder, FormStampError, decode_data_uri};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyModule};
use std::collections::BTreeMap;

fn to_py_err(err: FormStampError) -> PyErr {
    match err {
        FormStampError::Io(_) => PyIOError::new_err(err.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

#[pyclass(name = "FormStamp")]
struct PyFormStamp {
    inner: FormStamp,
}

#[pymethods]
impl PyFormStamp {
    #[new]
    #[pyo3(signature = (template, output_dir = None, debug_log = None))]
    fn new(template: &str, output_dir: Option<&str>, debug_log: Option<&str>) -> PyResult<Self> {
        let mut builder = FormStampBuilder::new().template(template);
        if let Some(dir) = output_dir {
            builder = builder.output_dir(dir);
        }
        if let Some(path) = debug_log {
            builder = builder.debug_log(path);
        }
        Ok(Self {
            inner: builder.build().map_err(to_py_err)?,
        })
    }

    #[getter]
    fn template_sha256(&self) -> String {
        self.inner.template().sha256().to_string()
    }

    #[getter]
    fn page_count(&self) -> usize {
        self.inner.template().page_count()
    }

    /// Stamp the submitted values and return `(filename, pdf_bytes)`.
    /// `signature` takes raw image bytes; `signature_data_uri` a browser
    /// `data:` URI (used only when `signature` is absent).
    #[pyo3(signature = (values, signature = None, signature_data_uri = None, grid = false))]
    fn generate(
        &self,
        py: Python<'_>,
        values: BTreeMap<String, String>,
        signature: Option<Vec<u8>>,
        signature_data_uri: Option<&str>,
        grid: bool,
    ) -> PyResult<(String, Py<PyBytes>)> {
        let decoded;
        let signature_bytes: Option<&[u8]> = match (signature.as_deref(), signature_data_uri) {
            (Some(bytes), _) => Some(bytes),
            (None, Some(uri)) => {
                decoded = decode_data_uri(uri).ok_or_else(|| {
                    PyValueError::new_err("signature_data_uri is not a valid data URI")
                })?;
                Some(decoded.as_slice())
            }
            (None, None) => None,
        };
        let document = self
            .inner
            .generate(&values, signature_bytes, grid)
            .map_err(to_py_err)?;
        Ok((
            document.filename,
            PyBytes::new_bound(py, &document.bytes).unbind(),
        ))
    }

    /// Write the calibration preview and return `(filename, pdf_bytes)`.
    fn preview_grid(&self, py: Python<'_>) -> PyResult<(String, Py<PyBytes>)> {
        let document = self.inner.preview_grid().map_err(to_py_err)?;
        Ok((
            document.filename,
            PyBytes::new_bound(py, &document.bytes).unbind(),
        ))
    }
}

#[pymodule]
fn _formstamp(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyFormStamp>()?;
    Ok(())
}
