/// Generate a frozen `#[pyclass]` struct whose fields are copied from the
/// same-named accessor methods of a core type.
///
/// Also generates a `from_core()` constructor.
macro_rules! define_accessor_result {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident from $core_type:ty {
            $($field:ident: $ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[pyo3::pyclass(frozen)]
        $vis struct $name {
            $(
                #[pyo3(get)]
                pub $field: $ty,
            )+
        }

        impl $name {
            pub fn from_core(c: &$core_type) -> Self {
                Self {
                    $(
                        $field: c.$field(),
                    )+
                }
            }
        }
    };
}

/// Build a `PyDict` from `key => value` pairs of Python-convertible values.
macro_rules! py_dict {
    ($py:expr, $($key:ident => $value:expr),+ $(,)?) => {{
        let dict = pyo3::types::PyDict::new($py);
        $(
            dict.set_item(stringify!($key), $value)?;
        )+
        dict
    }};
}
