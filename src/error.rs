use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("{flag} must be {requirement}")]
    OutOfRange {
        flag: &'static str,
        requirement: &'static str,
    },

    #[error("{flag}: '{text}' is not a whole number")]
    NotANumber { flag: &'static str, text: String },

    #[error("--start-year ({start}) must not be after --end-year ({end})")]
    InvertedHorizon { start: i32, end: i32 },

    #[error("horizon of {years} years exceeds the {max}-year limit")]
    HorizonTooLong { years: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
