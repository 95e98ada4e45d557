//! Builder for synthetic kernel memory images used by the integration tests.
//!
//! Structures are laid out with the offsets from `fixtures/profile.json` and
//! placed in the direct map; file data pages get their own physical frames
//! and `struct page` pointers into a fake `mem_map`.

#![allow(dead_code)]

use tmpfs_recover_core::memory::{AddressSpaceConfig, DirectMapSpace, PhysicalMemory, SparseMemory};
use tmpfs_recover_core::profile::Profile;

pub const PROFILE_JSON: &str = include_str!("../fixtures/profile.json");

pub const PAGE_OFFSET: u64 = 0xffff_8800_0000_0000;
pub const KERNEL_MAP: u64 = 0xffff_ffff_8000_0000;
pub const MEM_MAP: u64 = 0xffff_ea00_0000_0000;
pub const PAGE_STRUCT_SIZE: u64 = 64;

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;

/// First physical address handed out for kernel structures
const STRUCT_ARENA: u64 = 0x0010_0000;
/// First frame handed out for file data
const DATA_FRAME_BASE: u64 = 0x4000;

pub struct KernelImage {
    pub profile: Profile,
    pub memory: SparseMemory,
    next_struct: u64,
    next_frame: u64,
    mnt_ns: Option<u64>,
}

impl KernelImage {
    pub fn new() -> Self {
        let profile = Profile::from_json_str(PROFILE_JSON).unwrap();
        let mut image = Self {
            profile,
            memory: SparseMemory::new(),
            next_struct: STRUCT_ARENA,
            next_frame: DATA_FRAME_BASE,
            mnt_ns: None,
        };
        let mem_map = image.profile.symbol_address("mem_map").unwrap();
        image.write_u64(mem_map, MEM_MAP);
        image
    }

    pub fn space(&self) -> DirectMapSpace<&SparseMemory> {
        DirectMapSpace::new(&self.memory, AddressSpaceConfig::default())
    }

    // ---- raw memory -------------------------------------------------------

    fn phys(address: u64) -> u64 {
        if address >= KERNEL_MAP {
            address - KERNEL_MAP
        } else {
            assert!(address >= PAGE_OFFSET, "not a kernel address: {:#x}", address);
            address - PAGE_OFFSET
        }
    }

    pub fn alloc(&mut self, size: u64) -> u64 {
        let physical = self.next_struct;
        self.next_struct = (self.next_struct + size + 63) & !63;
        PAGE_OFFSET + physical
    }

    pub fn write_bytes(&mut self, address: u64, data: &[u8]) {
        self.memory.write(Self::phys(address), data);
    }

    pub fn write_u64(&mut self, address: u64, value: u64) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn read_u64(&self, address: u64) -> u64 {
        let bytes = self.memory.read_physical(Self::phys(address), 8).unwrap();
        u64::from_le_bytes(bytes.try_into().unwrap())
    }

    pub fn offset(&self, structure: &str, field: &str) -> u64 {
        self.profile.field(structure, field).unwrap().offset
    }

    fn size(&self, structure: &str) -> u64 {
        self.profile.struct_size(structure).unwrap()
    }

    fn set_u64(&mut self, structure: &str, field: &str, base: u64, value: u64) {
        let address = base + self.offset(structure, field);
        self.write_u64(address, value);
    }

    fn set_u32(&mut self, structure: &str, field: &str, base: u64, value: u32) {
        let address = base + self.offset(structure, field);
        self.write_bytes(address, &value.to_le_bytes());
    }

    fn set_u16(&mut self, structure: &str, field: &str, base: u64, value: u16) {
        let address = base + self.offset(structure, field);
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn string(&mut self, bytes: &[u8]) -> u64 {
        let address = self.alloc(bytes.len() as u64 + 1);
        let mut data = bytes.to_vec();
        data.push(0);
        self.write_bytes(address, &data);
        address
    }

    fn init_list(&mut self, head: u64) {
        let next = self.offset("list_head", "next");
        let prev = self.offset("list_head", "prev");
        self.write_u64(head + next, head);
        self.write_u64(head + prev, head);
    }

    fn list_add_tail(&mut self, head: u64, node: u64) {
        let next = self.offset("list_head", "next");
        let prev = self.offset("list_head", "prev");
        let tail = self.read_u64(head + prev);
        self.write_u64(node + next, head);
        self.write_u64(node + prev, tail);
        self.write_u64(tail + next, node);
        self.write_u64(head + prev, node);
    }

    // ---- dentries and inodes ------------------------------------------------

    /// A detached dentry that is its own parent
    pub fn dentry(&mut self, name: &[u8], inode: Option<u64>) -> u64 {
        let dentry = self.alloc(self.size("dentry"));
        let name_ptr = self.string(name);
        let qstr = dentry + self.offset("dentry", "d_name");

        self.set_u64("qstr", "name", qstr, name_ptr);
        self.set_u32("qstr", "len", qstr, name.len() as u32);
        self.set_u64("dentry", "d_inode", dentry, inode.unwrap_or(0));
        self.set_u64("dentry", "d_parent", dentry, dentry);

        let subdirs = dentry + self.offset("dentry", "d_subdirs");
        self.init_list(subdirs);
        let child = dentry + self.offset("dentry", "d_child");
        self.init_list(child);
        dentry
    }

    pub fn add_child(&mut self, parent: u64, child: u64) {
        let head = parent + self.offset("dentry", "d_subdirs");
        let node = child + self.offset("dentry", "d_child");
        self.list_add_tail(head, node);
        self.set_u64("dentry", "d_parent", child, parent);
    }

    pub fn inode(&mut self, mode: u32, size: u64, atime: i64, mtime: i64) -> u64 {
        let inode = self.alloc(self.size("inode"));
        self.set_u16("inode", "i_mode", inode, mode as u16);
        self.set_u64("inode", "i_size", inode, size);

        let atime_at = inode + self.offset("inode", "i_atime");
        self.set_u64("timespec", "tv_sec", atime_at, atime as u64);
        let mtime_at = inode + self.offset("inode", "i_mtime");
        self.set_u64("timespec", "tv_sec", mtime_at, mtime as u64);

        let mapping = inode + self.offset("inode", "i_data");
        self.set_u64("inode", "i_mapping", inode, mapping);
        self.set_u64("address_space", "host", mapping, inode);
        inode
    }

    /// Address of the inode's `radix_tree_root`
    pub fn page_tree(&self, inode: u64) -> u64 {
        inode + self.offset("inode", "i_data") + self.offset("address_space", "page_tree")
    }

    /// Place `contents` in a fresh physical frame; returns its `struct page`
    pub fn data_page(&mut self, contents: &[u8]) -> u64 {
        assert!(contents.len() <= 4096);
        let frame = self.next_frame;
        self.next_frame += 1;
        self.memory.write(frame * 4096, contents);
        MEM_MAP + frame * PAGE_STRUCT_SIZE
    }

    fn radix_node(&mut self, height: u32) -> u64 {
        let node = self.alloc(self.size("radix_tree_node"));
        self.set_u32("radix_tree_node", "height", node, height);
        node
    }

    /// Height of the smallest tree that can hold `index`
    pub fn height_for(index: u64) -> u32 {
        let mut height = 1;
        while height < 11 && index >> (6 * height) != 0 {
            height += 1;
        }
        height
    }

    /// Populate an inode's page cache with `(index, page)` entries.
    ///
    /// A single entry at index 0 is stored inline in the root; anything else
    /// gets a tree of the smallest height that fits the largest index.
    pub fn set_pages(&mut self, inode: u64, pages: &[(u64, u64)]) -> Option<u64> {
        let root = self.page_tree(inode);
        let rnode = root + self.offset("radix_tree_root", "rnode");

        if pages.is_empty() {
            self.write_u64(rnode, 0);
            return None;
        }
        if pages.len() == 1 && pages[0].0 == 0 {
            self.write_u64(rnode, pages[0].1);
            return None;
        }

        let max = pages.iter().map(|(index, _)| *index).max().unwrap_or(0);
        let height = Self::height_for(max.max(1));
        let top = self.radix_node(height);
        for &(index, page) in pages {
            self.radix_insert(top, height, index, page);
        }
        self.write_u64(rnode, top | 1);
        Some(top)
    }

    fn radix_insert(&mut self, top: u64, height: u32, index: u64, page: u64) {
        let slots = self.offset("radix_tree_node", "slots");
        let mut node = top;
        let mut level = height;
        loop {
            let shift = (level - 1) * 6;
            let slot = node + slots + ((index >> shift) & 63) * 8;
            if level == 1 {
                self.write_u64(slot, page);
                return;
            }
            let mut child = self.read_u64(slot);
            if child == 0 {
                child = self.radix_node(level - 1);
                self.write_u64(slot, child);
            }
            node = child;
            level -= 1;
        }
    }

    // ---- filesystem helpers ---------------------------------------------------

    pub fn directory(
        &mut self,
        parent: u64,
        name: &str,
        permissions: u32,
        atime: i64,
        mtime: i64,
    ) -> u64 {
        let inode = self.inode(S_IFDIR | permissions, 4096, atime, mtime);
        let dentry = self.dentry(name.as_bytes(), Some(inode));
        self.add_child(parent, dentry);
        dentry
    }

    /// Regular file whose every page is resident
    pub fn file(
        &mut self,
        parent: u64,
        name: &str,
        permissions: u32,
        contents: &[u8],
        atime: i64,
        mtime: i64,
    ) -> u64 {
        let inode = self.inode(S_IFREG | permissions, contents.len() as u64, atime, mtime);
        let pages: Vec<(u64, u64)> = contents
            .chunks(4096)
            .enumerate()
            .map(|(index, chunk)| (index as u64, self.data_page(chunk)))
            .collect();
        self.set_pages(inode, &pages);

        let dentry = self.dentry(name.as_bytes(), Some(inode));
        self.add_child(parent, dentry);
        inode
    }

    pub fn symlink(&mut self, parent: u64, name: &str) -> u64 {
        let inode = self.inode(S_IFLNK | 0o777, 8, 0, 0);
        let dentry = self.dentry(name.as_bytes(), Some(inode));
        self.add_child(parent, dentry);
        dentry
    }

    /// Negative dentry: a name with no inode behind it
    pub fn negative(&mut self, parent: u64, name: &str) -> u64 {
        let dentry = self.dentry(name.as_bytes(), None);
        self.add_child(parent, dentry);
        dentry
    }

    /// Superblock of type `fs_type` with a fresh root directory
    pub fn superblock(&mut self, fs_type: &str, atime: i64, mtime: i64) -> (u64, u64) {
        let fs_name = self.string(fs_type.as_bytes());
        let fs = self.alloc(self.size("file_system_type"));
        self.set_u64("file_system_type", "name", fs, fs_name);

        let root_inode = self.inode(S_IFDIR | 0o1777, 4096, atime, mtime);
        let root = self.dentry(b"/", Some(root_inode));

        let sb = self.alloc(self.size("super_block"));
        self.set_u64("super_block", "s_type", sb, fs);
        self.set_u64("super_block", "s_root", sb, root);
        (sb, root)
    }

    // ---- mounts -----------------------------------------------------------------

    fn namespace(&mut self) -> u64 {
        if let Some(ns) = self.mnt_ns {
            return ns;
        }
        let ns = self.alloc(self.size("mnt_namespace"));
        let head = ns + self.offset("mnt_namespace", "list");
        self.init_list(head);

        let nsproxy = self.alloc(self.size("nsproxy"));
        self.set_u64("nsproxy", "mnt_ns", nsproxy, ns);
        let init_task = self.profile.symbol_address("init_task").unwrap();
        self.set_u64("task_struct", "nsproxy", init_task, nsproxy);

        self.mnt_ns = Some(ns);
        ns
    }

    /// Mount `sb` on `mountpoint` inside `parent`; no parent makes it the root mount
    pub fn mount(
        &mut self,
        sb: u64,
        device: &str,
        parent: Option<u64>,
        mountpoint: Option<u64>,
    ) -> u64 {
        let ns = self.namespace();
        let mount = self.alloc(self.size("mount"));
        let root = self.read_u64(sb + self.offset("super_block", "s_root"));

        let vfsmount = mount + self.offset("mount", "mnt");
        self.set_u64("vfsmount", "mnt_root", vfsmount, root);
        self.set_u64("vfsmount", "mnt_sb", vfsmount, sb);

        self.set_u64("mount", "mnt_parent", mount, parent.unwrap_or(mount));
        self.set_u64("mount", "mnt_mountpoint", mount, mountpoint.unwrap_or(root));
        let devname = self.string(device.as_bytes());
        self.set_u64("mount", "mnt_devname", mount, devname);

        let head = ns + self.offset("mnt_namespace", "list");
        let node = mount + self.offset("mount", "mnt_list");
        self.list_add_tail(head, node);
        mount
    }
}

/// Deterministic, page-distinguishable file contents
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i / 4096) as u8).wrapping_mul(31) ^ (i as u8)).collect()
}
