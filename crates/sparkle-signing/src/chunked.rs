use std::io::Read;
use std::path::Path;

pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

pub(crate) enum ChunkOutcome {
    Completed,
    Aborted,
}

/// Feed the file to `consume` one chunk at a time, polling `abort` between
/// chunks.
pub(crate) fn for_each_chunk(
    path: &Path,
    abort: &dyn Fn() -> bool,
    mut consume: impl FnMut(&[u8]),
) -> std::io::Result<ChunkOutcome> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        if abort() {
            return Ok(ChunkOutcome::Aborted);
        }
        let read = file.read(&mut buffer)?;
        if read == 0 {
            return Ok(ChunkOutcome::Completed);
        }
        consume(&buffer[..read]);
    }
}
