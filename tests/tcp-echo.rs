//! §8 scenario 3: a listening socket accepts one connection, the client
//! sends 5 bytes, the server echoes them back unchanged.

use futures::io::{AsyncReadExt, AsyncWriteExt};

use corosync::net::{TcpListener, TcpStream};

#[test]
fn tcp_echo_round_trip() {
    futures::executor::block_on(async {
        let mut listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = async move {
            let (mut conn, _peer) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"Hello");
            conn.write_all(&buf).await.unwrap();
        };

        let client = async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"Hello").await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"Hello");
        };

        futures::join!(server, client);
    });
}
