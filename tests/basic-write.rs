use std::io::Read;
use std::os::unix::io::AsRawFd;

use corosync::Submission;
use corosync::event::Write;
use corosync::drive::demo;

const ASSERT: &[u8] = b"But this formidable power of death -";

#[test]
fn write_file() {
    let mut file = tempfile::tempfile().unwrap();
    let write = Write { fd: file.as_raw_fd(), buf: Vec::from(ASSERT).into_boxed_slice(), offset: 0 };
    let (_, result) = futures::executor::block_on(Submission::new(write, demo::driver()));
    assert_eq!(result.unwrap(), ASSERT.len());

    let mut buf = vec![];
    assert_eq!(file.read_to_end(&mut buf).unwrap(), ASSERT.len());
    assert_eq!(&buf[0..ASSERT.len()], ASSERT);
}
