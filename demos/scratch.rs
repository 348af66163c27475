//! Anonymous scratch memory.

use mapfile::{Flag, Mapper, Prot};

fn main() {
    let mapper = Mapper::anon();
    let mut scratch = mapper
        .map(mapfile::page_size() as i64, 0, Prot::READ | Prot::WRITE, Flag::empty())
        .unwrap();

    let msg = b"Hello, world!";
    scratch.bytes_mut().unwrap()[..msg.len()].copy_from_slice(msg);

    println!("{}", String::from_utf8_lossy(&scratch.bytes()[..msg.len()]));

    scratch.unmap().unwrap();
}
