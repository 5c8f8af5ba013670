use std::io::Read;
use std::os::unix::io::AsRawFd;

use corosync::Submission;
use corosync::event::WriteVectored;
use corosync::drive::demo;

const ASSERT: &[u8] = b"But this formidable power of death -";

#[test]
fn writev_file() {
    let mut file = tempfile::tempfile().unwrap();
    let bufs: Box<[Box<[u8]>]> = vec![
        ASSERT[0..4].to_vec().into_boxed_slice(),
        ASSERT[4..9].to_vec().into_boxed_slice(),
        ASSERT[9..].to_vec().into_boxed_slice(),
    ]
    .into_boxed_slice();
    let writev = WriteVectored { fd: file.as_raw_fd(), bufs, offset: 0 };
    let (_, result) = futures::executor::block_on(Submission::new(writev, demo::driver()));
    assert_eq!(result.unwrap(), ASSERT.len());

    let mut buf = vec![];
    assert_eq!(file.read_to_end(&mut buf).unwrap(), ASSERT.len());
    assert_eq!(&buf[0..ASSERT.len()], ASSERT);
}
