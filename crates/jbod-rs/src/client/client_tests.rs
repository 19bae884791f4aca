use super::*;
use crate::error::ErrorKind;
use crate::geometry::{ADDRESS_SPACE, MAX_IO_SIZE};
use crate::proto::Command;
use crate::sim::ReferenceArray;
use rand::{Rng, RngCore};
use tempfile::TempDir;

/// Wraps a transport and records every command sent through it.
struct Recording<T: Transport> {
    inner: T,
    log: Vec<Opcode>,
    fail_on: Option<Command>,
}

impl<T: Transport> Recording<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            log: Vec::new(),
            fail_on: None,
        }
    }

    fn commands(&self) -> Vec<Command> {
        self.log.iter().map(|op| op.command).collect()
    }
}

impl<T: Transport> Transport for Recording<T> {
    fn call(&mut self, opcode: Opcode, payload: Payload<'_>) -> Result<u16> {
        self.log.push(opcode);
        if self.fail_on == Some(opcode.command) {
            return Err(JbodError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            )));
        }
        self.inner.call(opcode, payload)
    }
}

fn client_with(capacity: Option<usize>) -> (TempDir, ArrayClient<Recording<ReferenceArray>>) {
    let dir = TempDir::new().expect("tmp dir");
    let array = ReferenceArray::open(dir.path()).expect("open array");
    let cache = match capacity {
        Some(c) => BlockCache::with_capacity(c).expect("cache"),
        None => BlockCache::new(),
    };
    (dir, ArrayClient::with_cache(Recording::new(array), cache))
}

fn mounted(capacity: Option<usize>) -> (TempDir, ArrayClient<Recording<ReferenceArray>>) {
    let (dir, mut client) = client_with(capacity);
    client.mount().expect("mount");
    client.transport_mut().log.clear();
    (dir, client)
}

#[test]
fn starts_unmounted_and_mount_toggles_state() {
    let (_dir, mut client) = client_with(None);
    assert_eq!(client.state(), MountState::Unmounted);

    client.mount().unwrap();
    assert!(client.is_mounted());

    let err = client.mount().unwrap_err();
    assert!(matches!(
        err,
        JbodError::Server {
            command: Command::Mount,
            ..
        }
    ));
    assert!(client.is_mounted(), "failed mount keeps state");

    client.unmount().unwrap();
    assert_eq!(client.state(), MountState::Unmounted);

    assert!(client.unmount().is_err());
    assert_eq!(client.state(), MountState::Unmounted);
}

#[test]
fn transport_failure_on_mount_keeps_unmounted() {
    let (_dir, mut client) = client_with(None);
    client.transport_mut().fail_on = Some(Command::Mount);
    let err = client.mount().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(!client.is_mounted());
}

#[test]
fn unmounted_operations_never_reach_transport() {
    let (_dir, mut client) = client_with(Some(4));
    let mut buf = [0u8; 16];
    let err = client.read(0, 16, &mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateViolation);
    let err = client.write(0, 16, &buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateViolation);
    assert!(client.transport().log.is_empty());

    client.mount().unwrap();
    assert_eq!(client.read(0, 16, &mut buf).unwrap(), 16);
    assert_eq!(client.write(0, 16, &buf).unwrap(), 16);
}

#[test]
fn invalid_requests_fail_without_side_effects() {
    let (_dir, mut client) = mounted(Some(4));
    let mut big = vec![0u8; 2048];

    let space = u32::try_from(ADDRESS_SPACE).unwrap();
    let max = u32::try_from(MAX_IO_SIZE).unwrap();

    assert!(client.read(space - 10, 11, &mut big).is_err());
    assert!(client.write(space - 10, 11, &big).is_err());
    assert!(client.read(0, max + 1, &mut big).is_err());
    assert!(client.write(0, max + 1, &big).is_err());

    let err = client.read(0, 8, &mut []).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = client.write(0, 8, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(client.transport().log.is_empty());
    assert_eq!(client.cache().stats().lookups, 0);
}

#[test]
fn zero_length_is_trivial_success() {
    let (_dir, mut client) = mounted(None);
    assert_eq!(client.read(123, 0, &mut []).unwrap(), 0);
    assert_eq!(client.write(space_end(), 0, &[]).unwrap(), 0);
    assert!(client.transport().log.is_empty());
}

fn space_end() -> u32 {
    u32::try_from(ADDRESS_SPACE).unwrap()
}

#[test]
fn read_at_last_byte_of_space_succeeds() {
    let (_dir, mut client) = mounted(None);
    let mut buf = [0xFFu8; 1];
    assert_eq!(client.read(space_end() - 1, 1, &mut buf).unwrap(), 1);
    assert_eq!(buf, [0]);
}

#[test]
fn read_miss_issues_seek_seek_read_per_block() {
    let (_dir, mut client) = mounted(None);
    let mut buf = [0u8; 4];
    client.read(254, 4, &mut buf).unwrap();

    use Command::{ReadBlock, SeekToBlock, SeekToDisk};
    assert_eq!(
        client.transport().commands(),
        vec![SeekToDisk, SeekToBlock, ReadBlock, SeekToDisk, SeekToBlock, ReadBlock]
    );
    let seeks: Vec<u8> = client
        .transport()
        .log
        .iter()
        .filter(|op| op.command == SeekToBlock)
        .map(|op| op.block)
        .collect();
    assert_eq!(seeks, vec![0, 1]);
}

#[test]
fn write_issues_read_modify_write_per_block() {
    let (_dir, mut client) = mounted(None);
    client.write(327_937, 3, &[1, 2, 3]).unwrap();

    use Command::{ReadBlock, SeekToBlock, SeekToDisk, WriteBlock};
    assert_eq!(
        client.transport().commands(),
        vec![SeekToDisk, SeekToBlock, ReadBlock, SeekToDisk, SeekToBlock, WriteBlock]
    );
    assert_eq!(client.transport().log[0].disk, 5);
    assert_eq!(client.transport().log[1].block, 0);
}

#[test]
fn write_preserves_neighbouring_bytes() {
    let (_dir, mut client) = mounted(None);
    let base = vec![0xAAu8; 512];
    client.write(1024, 512, &base).unwrap();
    client.write(1200, 10, &[0x55; 10]).unwrap();

    let mut back = vec![0u8; 512];
    client.read(1024, 512, &mut back).unwrap();
    let mut expected = base;
    expected[176..186].copy_from_slice(&[0x55; 10]);
    assert_eq!(back, expected);
}

#[test]
fn write_populates_cache_and_read_hits_skip_network() {
    let (_dir, mut client) = mounted(Some(8));
    let data = [7u8; 300];
    client.write(100, 300, &data).unwrap();
    assert_eq!(client.cache().entries().iter().filter(|e| e.valid).count(), 2);

    client.transport_mut().log.clear();
    let mut back = [0u8; 300];
    assert_eq!(client.read(100, 300, &mut back).unwrap(), 300);
    assert_eq!(back, data);
    assert!(client.transport().log.is_empty(), "both blocks served from cache");
    assert_eq!(client.cache().stats().hits, 2);
}

#[test]
fn read_miss_does_not_populate_cache_by_default() {
    let (_dir, mut client) = mounted(Some(8));
    let mut buf = [0u8; 16];
    client.read(0, 16, &mut buf).unwrap();
    assert!(client.cache().entries().iter().all(|e| !e.valid));

    client.transport_mut().log.clear();
    client.read(0, 16, &mut buf).unwrap();
    assert_eq!(client.transport().log.len(), 3);
}

#[test]
fn read_and_write_fill_caches_read_misses() {
    let (_dir, client) = mounted(Some(8));
    let mut client = client.cache_fill(CacheFill::ReadAndWrite);
    let mut buf = [0u8; 16];
    client.read(0, 16, &mut buf).unwrap();
    assert_eq!(client.cache().entries().iter().filter(|e| e.valid).count(), 1);

    client.transport_mut().log.clear();
    client.read(0, 16, &mut buf).unwrap();
    assert!(client.transport().log.is_empty());
}

#[test]
fn rewriting_cached_block_updates_cache() {
    let (_dir, mut client) = mounted(Some(2));
    client.write(0, 4, &[1, 1, 1, 1]).unwrap();
    client.write(2, 4, &[2, 2, 2, 2]).unwrap();

    let valid: Vec<_> = client.cache().entries().iter().filter(|e| e.valid).collect();
    assert_eq!(valid.len(), 1, "second write must update, not duplicate");
    assert_eq!(&valid[0].data[..6], &[1, 1, 2, 2, 2, 2]);

    client.cache_mut().destroy().unwrap();
    let mut back = [0u8; 6];
    client.read(0, 6, &mut back).unwrap();
    assert_eq!(back, [1, 1, 2, 2, 2, 2]);
}

#[test]
fn transport_failure_fails_whole_operation() {
    let (_dir, mut client) = mounted(None);
    client.transport_mut().fail_on = Some(Command::ReadBlock);
    let mut buf = [0u8; 8];
    let err = client.read(0, 8, &mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);

    client.transport_mut().fail_on = Some(Command::WriteBlock);
    let err = client.write(0, 8, &buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn failed_write_back_leaves_cache_untouched() {
    let (_dir, mut client) = mounted(Some(4));
    client.transport_mut().fail_on = Some(Command::WriteBlock);
    assert!(client.write(0, 8, &[9; 8]).is_err());
    assert!(client.cache().entries().iter().all(|e| !e.valid));
}

#[test]
fn random_round_trips_with_and_without_cache() {
    let mut rng = rand::rng();
    for capacity in [None, Some(2), Some(64)] {
        let (_dir, mut client) = mounted(capacity);
        for _ in 0..40 {
            let len = rng.random_range(1..=MAX_IO_SIZE);
            let addr = rng.random_range(0..=ADDRESS_SPACE - len);
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);

            let addr = u32::try_from(addr).unwrap();
            let len = u32::try_from(len).unwrap();
            assert_eq!(client.write(addr, len, &data).unwrap(), len);

            let mut back = vec![0u8; data.len()];
            assert_eq!(client.read(addr, len, &mut back).unwrap(), len);
            assert_eq!(back, data, "round trip at {addr} len {len}");
        }
    }
}

#[test]
fn cache_never_diverges_from_server() {
    let (dir, mut client) = mounted(Some(3));
    let mut rng = rand::rng();
    let mut model = vec![0u8; 8 * 1024];
    for _ in 0..200 {
        let len = rng.random_range(1..=512usize);
        let addr = rng.random_range(0..=model.len() - len);
        let mut data = vec![0u8; len];
        rng.fill_bytes(&mut data);
        client
            .write(u32::try_from(addr).unwrap(), u32::try_from(len).unwrap(), &data)
            .unwrap();
        model[addr..addr + len].copy_from_slice(&data);
    }

    for entry in client.cache().entries().iter().filter(|e| e.valid) {
        let off =
            entry.disk as usize * crate::geometry::DISK_SIZE + entry.block as usize * BLOCK_SIZE;
        assert_eq!(&entry.data[..], &model[off..off + BLOCK_SIZE]);
    }

    client.unmount().unwrap();
    drop(client);
    let mut fresh = ArrayClient::new(ReferenceArray::open(dir.path()).unwrap());
    fresh.mount().unwrap();
    let mut back = vec![0u8; MAX_IO_SIZE];
    for start in (0..model.len()).step_by(MAX_IO_SIZE) {
        fresh
            .read(
                u32::try_from(start).unwrap(),
                u32::try_from(MAX_IO_SIZE).unwrap(),
                &mut back,
            )
            .unwrap();
        assert_eq!(&back[..], &model[start..start + MAX_IO_SIZE]);
    }
}
