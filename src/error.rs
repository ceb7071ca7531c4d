use thiserror::Error;

/// Fatal load failures. There is no partial load: any of these aborts the
/// whole dataset, and the menu keeps running without data.
#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("No se pudo abrir el fichero de datos '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error leyendo el CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Falta la columna obligatoria '{0}' en la cabecera")]
    MissingColumn(String),
}

/// A ranking lookup was requested for a key with no rows in the base table.
/// This is a caller-contract violation: production flows pick the key from
/// the dataset itself, so hitting this outside tests indicates a bug.
#[derive(Error, Debug)]
#[error("'{0}' no existe en el conjunto de datos")]
pub struct NotFoundError(pub String);

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Error al dibujar el gráfico: {0}")]
    Chart(String),

    #[error("Error al incrustar la imagen en el PDF: {0}")]
    Image(String),
}
