//! End-to-end pipeline scenarios live in `tests/`.
