use std::fs::File;
use std::os::unix::io::AsRawFd;

use corosync::Submission;
use corosync::event::ReadVectored;
use corosync::drive::demo;

const ASSERT: &[u8] = b"But this formidable power of death -";

#[test]
fn readv_file() {
    let file = File::open("props.txt").unwrap();
    let bufs: Box<[Box<[u8]>]> =
        vec![vec![0; 4].into_boxed_slice(), vec![0; 5].into_boxed_slice(), vec![0; 10].into_boxed_slice()]
            .into_boxed_slice();
    let readv = ReadVectored { fd: file.as_raw_fd(), bufs, offset: 0 };
    let (readv, result) = futures::executor::block_on(Submission::new(readv, demo::driver()));
    assert!(result.is_ok());
    assert_eq!(readv.bufs[0][..], ASSERT[0..4]);
    assert_eq!(readv.bufs[1][..], ASSERT[4..9]);
    assert_eq!(readv.bufs[2][..], ASSERT[9..19]);
}
