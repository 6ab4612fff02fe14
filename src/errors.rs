use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub(crate) enum Error {
    #[error("invalid model parameter: {msg}")]
    InvalidModelParam { msg: String },
    #[error("byte {byte:#04x} at position {pos} is not a member of the {alphabet} alphabet")]
    UnknownSymbol { byte: u8, pos: usize, alphabet: String },
    #[error("scoring matrix must be square, got {rows} rows and {cols} columns")]
    NonSquareScoringMatrix { rows: usize, cols: usize },
    #[error("scoring matrix size {got} does not match alphabet size {expected}")]
    ScoringMatrixAlphabetMismatch { got: usize, expected: usize },
    #[error("could not find a scale factor lambda for the given scoring matrix")]
    LambdaNotFound,
    #[error("unsupported alphabet {name}")]
    UnknownAlphabet { name: String },
    #[error("--mask-table must assign exactly one output byte per alphabet symbol")]
    InvalidMaskTable,
    #[error("no input files given")]
    MissingInput,
    #[error("invalid config file {path}: {msg}")]
    InvalidConfig { path: PathBuf, msg: String },
    #[error("record {name} in {path} is empty")]
    EmptyRecord { name: String, path: PathBuf },
}
