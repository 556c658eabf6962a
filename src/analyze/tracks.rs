use anyhow::{Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use twister::models::RawTrackRecord;

/// Load storm track rows from a CSV (optionally gzipped) keyed by header
pub fn load_tracks(path: &Path) -> Result<Vec<RawTrackRecord>> {
    info!("Loading track records from {}", path.display());

    let file = File::open(path).context("Failed to open track file")?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let records = read_tracks(reader)?;
    info!("Read {} track records", records.len());
    Ok(records)
}

pub fn read_tracks<R: Read>(reader: R) -> Result<Vec<RawTrackRecord>> {
    //schema (SPC 1950-present actual tornadoes)

    //om,yr,mo,dy,date,time,tz,st,stf,stn,mag,inj,fat,loss,closs,slat,slon,elat,elon,len,wid,...
    //192,1950,10,1,1950-10-01,21:00:00,3,OK,40,23,1,0,0,4,0,36.73,-102.52,36.88,-102.52,15.8,10,...

    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Failed to read track header row")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for (i, result) in csv_reader.records().enumerate() {
        let row = result.with_context(|| format!("Malformed track row {}", i + 1))?;
        let fields: BTreeMap<String, String> = headers
            .iter()
            .cloned()
            .zip(row.iter().map(str::to_string))
            .collect();
        records.push(RawTrackRecord::new(i + 1, fields));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_keyed_by_header() {
        let data = "om,yr,slat,slon\n192, 1950 ,36.73,-102.52\n193,1950,0,0\n";
        let records = read_tracks(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
        assert_eq!(records[0].get("yr"), Some("1950"));
        assert_eq!(records[1].get("slat"), Some("0"));
        assert!(!records[0].has("elat"));
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let data = "om,yr\n1,1950,extra\n";
        assert!(read_tracks(data.as_bytes()).is_err());
    }

    #[test]
    fn test_gzip_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"om,yr\n1,2001\n").unwrap();
        enc.finish().unwrap();

        let records = load_tracks(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("om"), Some("1"));
    }
}
