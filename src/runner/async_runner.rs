use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::{csv_utils::write_csv, dto::ScriptRow, snapshot::SnapshotUpdater, Engine};

use csv_async::{AsyncReaderBuilder, Error as CsvError, Trim};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use super::script::Script;

const BUFFER_SIZE: usize = 1024;

type Result<T, E = Box<dyn Error + Send + Sync>> = std::result::Result<T, E>;

/// Runs an operation script against the engine and writes the final balances
/// to the provided writer.
/// Spawns two tasks:
/// * CSV reader - streams script rows from the input file, deserializes them and sends them to the processor via channel.
/// * Processor - receives rows from the channel and applies them in order until the channel is closed.
///
/// # Arguments
/// * `input_path` - Path to the input CSV script
/// * `engine` - Engine the rows are applied to
/// * `updater` - Snapshot updater triggered by `snapshot` rows
/// * `writer` - Where to write the account balances (e.g. stdout)
///
/// # Errors
/// Returns an error if:
/// * The input file cannot be read
/// * The CSV is malformed
/// * A final balance cannot be derived
/// * Writing to the output fails
///
/// Rows rejected by the engine are logged and skipped.
pub async fn run<P, W>(
    input_path: P,
    engine: Arc<Engine>,
    updater: Arc<SnapshotUpdater>,
    writer: W,
) -> Result<()>
where
    P: AsRef<Path>,
    W: Write,
{
    let (tx, rx) = mpsc::channel(BUFFER_SIZE);
    let input_path = input_path.as_ref().to_owned();

    let reader_handle = tokio::spawn(read_script(input_path, tx));
    let processor_handle = tokio::spawn(process_script(rx, Script::new(engine, updater)));

    // A malformed script fails the run even if the processor is still busy.
    reader_handle.await??;
    let script = processor_handle.await?;

    let rows = script.balances().await?;
    write_csv(writer, rows.into_iter())?;
    Ok(())
}

/// Reads and deserializes script rows from a CSV file.
/// Returns them through the provided channel.
async fn read_script(
    input_path: impl AsRef<Path> + Send,
    tx: mpsc::Sender<ScriptRow>,
) -> Result<(), CsvError> {
    let file = File::open(input_path).await?;
    let mut csv_reader = AsyncReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .create_deserializer(file);

    let mut records = csv_reader.deserialize::<ScriptRow>();
    while let Some(result) = records.next().await {
        let row = result?;
        if tx.send(row).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Applies rows received through the channel.
/// Returns the script state once the channel is closed by the reader.
async fn process_script(mut rx: mpsc::Receiver<ScriptRow>, mut script: Script) -> Script {
    let mut line = 1usize;
    let mut applied = 0usize;
    while let Some(row) = rx.recv().await {
        line += 1;
        let op = row.op;
        match script.apply(row).await {
            Ok(()) => applied += 1,
            Err(err) => warn!(line, ?op, error = %err, "skipped script row"),
        }
    }
    info!(rows = line - 1, applied, "script finished");
    script
}
