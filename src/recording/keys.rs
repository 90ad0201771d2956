// src/recording/keys.rs
//! Metadata store key layout

/// Registry field of the derived index file
pub const INDEX_FILE_KEY: &str = "@index_file";

/// Channel announcing a closed recording (payload: info key)
pub const CLOSE_REC_CHANNEL: &str = "close_rec";

/// Channel asking writers to close and delete a file (payload: local path)
pub const DELETE_FILE_CHANNEL: &str = "handle_delete_file";

pub fn info_key(rec: &str) -> String {
    format!("r:{}:info", rec)
}

pub fn open_key(rec: &str) -> String {
    format!("r:{}:open", rec)
}

pub fn page_key(rec: &str) -> String {
    format!("r:{}:page", rec)
}

pub fn cdxj_key(rec: &str) -> String {
    format!("r:{}:cdxj", rec)
}

/// Remote-archive sources
pub fn ra_key(rec: &str) -> String {
    format!("r:{}:ra", rec)
}

/// File registry (name -> location)
pub fn warc_key(rec: &str) -> String {
    format!("r:{}:warc", rec)
}

/// Commit-wait lease for a local file
pub fn commit_wait_key(local_path: &str) -> String {
    format!("w:{}", local_path)
}

/// Every key owned by a recording
pub fn all_keys(rec: &str) -> [String; 6] {
    [
        info_key(rec),
        open_key(rec),
        page_key(rec),
        cdxj_key(rec),
        ra_key(rec),
        warc_key(rec),
    ]
}
