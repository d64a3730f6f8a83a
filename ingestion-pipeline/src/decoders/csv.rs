use async_trait::async_trait;
use common::error::AppError;
use common::types::{ChunkMetadata, ContentChunk, ProcessedContent, SourceType};
use serde_json::{json, Map, Value};
use tracing::info;

use super::Decoder;

/// Decodes a CSV document into one chunk per data row. The first record
/// is the header row; rows shorter than the header simply skip the
/// missing columns. The shared chunker is not involved: a row is already
/// the right retrieval granularity.
pub struct CsvDecoder {
    content: Vec<u8>,
    filename: String,
}

impl CsvDecoder {
    pub fn new(content: Vec<u8>, filename: String) -> Self {
        Self { content, filename }
    }
}

#[async_trait]
impl Decoder for CsvDecoder {
    fn source_type(&self) -> SourceType {
        SourceType::Csv
    }

    async fn decode(&self, chatbot_id: &str, user_id: &str) -> Result<ProcessedContent, AppError> {
        info!(filename = %self.filename, chatbot_id, "Decoding CSV file");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(self.content.as_slice());

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| AppError::Decode(format!("failed to read CSV: {e}")))?;
            records.push(record);
        }

        if records.is_empty() {
            return Err(AppError::Decode("CSV file is empty".into()));
        }

        let headers: Vec<String> = records[0].iter().map(str::to_string).collect();
        let data_rows = &records[1..];

        if data_rows.is_empty() {
            return Err(AppError::Decode("CSV file has no data rows".into()));
        }

        let mut chunks = Vec::with_capacity(data_rows.len());
        let mut full_content = String::new();

        for (i, row) in data_rows.iter().enumerate() {
            let mut body = String::new();
            let mut row_data = Map::new();

            for (j, value) in row.iter().enumerate() {
                if let Some(header) = headers.get(j) {
                    body.push_str(&format!("{header}: {value}\n"));
                    row_data.insert(header.clone(), json!(value));
                }
            }

            let body = body.trim().to_string();

            let mut metadata = ChunkMetadata::new();
            metadata.insert("filename".into(), json!(self.filename));
            // 1-based over the file, counting the header row.
            metadata.insert("row_number".into(), json!(i + 2));
            metadata.insert("row_data".into(), Value::Object(row_data));
            metadata.insert("headers".into(), json!(headers));

            chunks.push(ContentChunk::new(i, body.clone(), metadata));

            full_content.push_str(&body);
            full_content.push_str("\n---\n");
        }

        info!(
            filename = %self.filename,
            chunks = chunks.len(),
            rows = data_rows.len(),
            "CSV decoded"
        );

        let mut metadata = ChunkMetadata::new();
        metadata.insert("filename".into(), json!(self.filename));
        metadata.insert("fileSize".into(), json!(self.content.len()));
        metadata.insert("contentType".into(), json!("text/csv"));
        metadata.insert("headers".into(), json!(headers));
        metadata.insert("rowCount".into(), json!(data_rows.len()));
        metadata.insert("chatbotId".into(), json!(chatbot_id));
        metadata.insert("userId".into(), json!(user_id));

        Ok(ProcessedContent {
            source_type: SourceType::Csv,
            topic: self.filename.clone(),
            content: full_content,
            chunks,
            metadata,
        })
    }
}
