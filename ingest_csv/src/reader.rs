//! Reading a staged CSV file in fixed-size batches.

use std::{
    cmp::min,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use csv::StringRecord;
use flate2::read::MultiGzDecoder;

use crate::common::*;
use crate::errors::LoadError;

/// Never preallocate more than this many records per batch.
const MAX_PREALLOCATED_RECORDS: usize = 4096;

/// A batch of raw CSV records, in file order.
#[derive(Clone, Debug)]
pub struct RawBatch {
    /// Zero-based index of our first record within the file.
    first_row: u64,
    records: Vec<StringRecord>,
}

impl RawBatch {
    /// Create a new batch starting at `first_row`.
    pub fn new(first_row: u64, records: Vec<StringRecord>) -> Self {
        Self { first_row, records }
    }

    /// Zero-based index of our first record within the file.
    pub fn first_row(&self) -> u64 {
        self.first_row
    }

    /// Our records.
    pub fn records(&self) -> &[StringRecord] {
        &self.records
    }

    /// The number of records in this batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Is this batch empty? (Batches returned by [`CsvBatchReader`] never are.)
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads a CSV file as a finite sequence of batches holding at most
/// `batch_size` records each. Each batch consumes the underlying file, so the
/// sequence cannot be restarted.
pub struct CsvBatchReader {
    path: PathBuf,
    rdr: csv::Reader<Box<dyn Read + Send>>,
    headers: StringRecord,
    batch_size: usize,
    next_row: u64,
}

impl CsvBatchReader {
    /// Open `path` and read its header row. Files ending in `.gz` are
    /// decompressed as we go.
    pub fn open(path: &Path, batch_size: usize) -> Result<Self, LoadError> {
        if batch_size == 0 {
            return Err(LoadError::InvalidBatchSize);
        }
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_owned(),
            source,
        })?;
        let input: Box<dyn Read + Send> = if is_gzipped(path) {
            debug!("decompressing {} as gzip", path.display());
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(file)
        };
        let mut rdr = csv::Reader::from_reader(input);
        let headers = rdr
            .headers()
            .map_err(|source| LoadError::Read {
                path: path.to_owned(),
                source,
            })?
            .to_owned();
        Ok(Self {
            path: path.to_owned(),
            rdr,
            headers,
            batch_size,
            next_row: 0,
        })
    }

    /// The header row shared by every batch.
    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    /// Read the next batch, or return `None` once the file is exhausted.
    pub fn next_batch(&mut self) -> Result<Option<RawBatch>, LoadError> {
        let mut records =
            Vec::with_capacity(min(self.batch_size, MAX_PREALLOCATED_RECORDS));
        let mut record = StringRecord::new();
        while records.len() < self.batch_size {
            let more = self
                .rdr
                .read_record(&mut record)
                .map_err(|source| LoadError::Read {
                    path: self.path.clone(),
                    source,
                })?;
            if !more {
                break;
            }
            records.push(record.clone());
        }
        if records.is_empty() {
            trace!("reached end of {}", self.path.display());
            return Ok(None);
        }

        let first_row = self.next_row;
        self.next_row += records.len() as u64;
        Ok(Some(RawBatch::new(first_row, records)))
    }
}

impl Iterator for CsvBatchReader {
    type Item = Result<RawBatch, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

/// Should we treat `path` as gzip-compressed?
fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    const SAMPLE_CSV: &str = "\
VendorID,tpep_pickup_datetime,tpep_dropoff_datetime
1,2021-01-01 00:30:10,2021-01-01 00:36:12
2,2021-01-01 00:51:20,2021-01-01 00:52:19
1,2021-01-01 00:43:30,2021-01-01 01:11:06
1,2021-01-01 00:15:48,2021-01-01 00:31:01
2,2021-01-01 00:31:49,2021-01-01 00:48:21
";

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(data).unwrap();
        path
    }

    #[test]
    fn reads_batches_of_at_most_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "trips.csv", SAMPLE_CSV.as_bytes());
        let reader = CsvBatchReader::open(&path, 2).unwrap();
        assert_eq!(
            reader.headers(),
            vec!["VendorID", "tpep_pickup_datetime", "tpep_dropoff_datetime"]
        );
        let batches = reader.collect::<Result<Vec<_>, _>>().unwrap();
        let shape = batches
            .iter()
            .map(|b| (b.first_row(), b.len()))
            .collect::<Vec<_>>();
        assert_eq!(shape, vec![(0, 2), (2, 2), (4, 1)]);
        assert_eq!(&batches[2].records()[0][0], "2");
    }

    #[test]
    fn stays_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "trips.csv", SAMPLE_CSV.as_bytes());
        let mut reader = CsvBatchReader::open(&path, 10).unwrap();
        assert_eq!(reader.next_batch().unwrap().unwrap().len(), 5);
        assert!(reader.next_batch().unwrap().is_none());
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn header_only_file_has_no_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "empty.csv",
            b"VendorID,tpep_pickup_datetime,tpep_dropoff_datetime\n",
        );
        let mut reader = CsvBatchReader::open(&path, 10).unwrap();
        assert_eq!(reader.headers().len(), 3);
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn reads_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(vec![], Compression::default());
        encoder.write_all(SAMPLE_CSV.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();
        let path = write_file(dir.path(), "trips.csv.gz", &gz);
        let batches = CsvBatchReader::open(&path, 3)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(batches.iter().map(RawBatch::len).sum::<usize>(), 5);
    }

    #[test]
    fn ragged_rows_are_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "ragged.csv", b"a,b\n1,2\n3\n");
        let mut reader = CsvBatchReader::open(&path, 10).unwrap();
        assert!(matches!(reader.next_batch(), Err(LoadError::Read { .. })));
    }

    #[test]
    fn zero_batch_size_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "trips.csv", SAMPLE_CSV.as_bytes());
        let result = CsvBatchReader::open(&path, 0);
        assert!(matches!(result, Err(LoadError::InvalidBatchSize)));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CsvBatchReader::open(&dir.path().join("nope.csv"), 10);
        assert!(matches!(result, Err(LoadError::Open { .. })));
    }
}
