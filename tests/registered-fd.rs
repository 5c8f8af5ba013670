use std::os::unix::io::IntoRawFd;

use corosync::event::*;
use corosync::drive::{demo, Drive};

use iou::sqe::*;

#[test]
fn test_registered_fd_ops() {
    // open and register file
    let file = std::fs::File::open("props.txt").unwrap();
    let fd = demo::registrar().unwrap()
                  .register_files(&[file.into_raw_fd()]).unwrap().next().unwrap();

    futures::executor::block_on(async move {
        // read file via the registered fd
        let buf = vec![0; 1024].into_boxed_slice();
        let (event, result) = demo::driver().submit(Read { fd, buf, offset: 0 }).await;
        let n = result.unwrap() as _;
        let _data = String::from_utf8_lossy(&event.buf[..n]).into_owned();

        // statx the registered fd
        let (event, result) = demo::driver().submit(Statx::without_path(
            fd,
            StatxFlags::empty(),
            StatxMode::all(),
        )).await;
        result.unwrap();
        let _ = event.statx;

        // close file
        let (_, result) = demo::driver().submit(Close { fd }).await;
        result.unwrap();
    });
}
