//! Class registry and module linker
//!
//! Classes are keyed by their qualified name. Classes of the program being
//! run keep their declared names; classes of a module pulled in through a
//! `~file~class` name are registered as `~file~class`. Each file is loaded at
//! most once.

use crate::bytecode::{ClassDecl, Function, Member, Module, START_CLASS};
use crate::error::VmError;
use crate::heap::{HeapKind, Store};
use crate::value::{tag, HeapId, Object, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

/// Where module bytes come from
pub trait ModuleSource {
    /// Read the module stored under `file`
    fn load(&self, file: &str) -> Result<Vec<u8>, VmError>;
}

/// Modules stored as files in one directory
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ModuleSource for FileSource {
    fn load(&self, file: &str) -> Result<Vec<u8>, VmError> {
        let path = self.dir.join(file);
        std::fs::read(&path).map_err(|source| VmError::Io {
            name: path.display().to_string(),
            source,
        })
    }
}

/// Modules held in memory. Clones share their contents and load counters.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    modules: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    loads: Rc<RefCell<HashMap<String, usize>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file: impl Into<String>, bytes: Vec<u8>) {
        self.modules.borrow_mut().insert(file.into(), bytes);
    }

    /// How many times `file` has been read
    pub fn load_count(&self, file: &str) -> usize {
        self.loads.borrow().get(file).copied().unwrap_or(0)
    }
}

impl ModuleSource for MemorySource {
    fn load(&self, file: &str) -> Result<Vec<u8>, VmError> {
        *self.loads.borrow_mut().entry(file.to_string()).or_default() += 1;
        self.modules
            .borrow()
            .get(file)
            .cloned()
            .ok_or_else(|| VmError::Io {
                name: file.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such module"),
            })
    }
}

/// Index of a loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub usize);

/// A module installed in the VM
#[derive(Debug)]
pub struct LoadedModule {
    /// File the module came from; `None` for the program being run
    pub file: Option<String>,
    pub constants: Vec<Value>,
    /// Heap shared by every method of the module
    pub heap: HeapId,
    /// Instance of the module's implicit top-level class, once created
    pub start_instance: Option<HeapId>,
}

impl LoadedModule {
    /// Registry key of a class named `name` inside this module
    pub fn qualify(&self, name: &str) -> String {
        qualify(self.file.as_deref(), name)
    }
}

/// A class ready for use
#[derive(Debug)]
pub struct Class {
    /// Qualified name
    pub name: String,
    pub module: ModuleId,
    pub members: Vec<Member>,
    member_index: HashMap<String, usize>,
    methods: HashMap<String, Rc<Function>>,
}

impl Class {
    fn new(name: String, module: ModuleId, decl: ClassDecl) -> Self {
        let member_index = decl
            .members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        let methods = decl
            .methods
            .into_iter()
            .map(|f| (f.name.clone(), Rc::new(f)))
            .collect();
        Self {
            name,
            module,
            members: decl.members,
            member_index,
            methods,
        }
    }

    /// Position of a member in the member list
    pub fn member_offset(&self, name: &str) -> Option<usize> {
        self.member_index.get(name).copied()
    }

    pub fn method(&self, name: &str) -> Option<Rc<Function>> {
        self.methods.get(name).cloned()
    }

    /// Fresh instance layout: `[class name, members...]`
    pub fn instance_template(&self) -> Vec<Object> {
        let mut objects = Vec::with_capacity(self.members.len() + 1);
        let mut header = Object::declared(vec![tag::STRING]);
        header.value = Value::Str(self.name.clone());
        objects.push(header);
        objects.extend(self.members.iter().map(|m| Object::declared(m.tags.clone())));
        objects
    }
}

/// Registry key of `name` as seen from a module loaded from `file`
pub fn qualify(file: Option<&str>, name: &str) -> String {
    match file {
        Some(file) if !name.starts_with('~') => format!("~{}~{}", file, name),
        _ => name.to_string(),
    }
}

/// Split `~file~class` into its parts
pub fn split_qualified(name: &str) -> Result<(&str, &str), VmError> {
    name.strip_prefix('~')
        .and_then(|rest| rest.split_once('~'))
        .filter(|(file, class)| !file.is_empty() && !class.is_empty())
        .ok_or_else(|| VmError::InvalidClassName(name.to_string()))
}

/// Class table and module cache of one VM
pub struct Registry {
    classes: HashMap<String, Rc<Class>>,
    modules: Vec<LoadedModule>,
    files: HashMap<String, ModuleId>,
    source: Box<dyn ModuleSource>,
}

impl Registry {
    pub fn new(source: Box<dyn ModuleSource>) -> Self {
        Self {
            classes: HashMap::new(),
            modules: Vec::new(),
            files: HashMap::new(),
            source,
        }
    }

    pub fn set_source(&mut self, source: Box<dyn ModuleSource>) {
        self.source = source;
    }

    /// Install a decoded module: instantiate its heap and register its classes
    pub fn install(
        &mut self,
        store: &mut Store,
        file: Option<String>,
        module: Module,
    ) -> Result<ModuleId, VmError> {
        let id = ModuleId(self.modules.len());
        let objects = module.heap.into_iter().map(Object::declared).collect();
        let heap = store.alloc(HeapKind::Module, objects);

        for decl in module.classes {
            let name = qualify(file.as_deref(), &decl.name);
            debug!(class = %name, module = id.0, "register class");
            self.classes
                .insert(name.clone(), Rc::new(Class::new(name, id, decl)));
        }

        if let Some(file) = &file {
            self.files.insert(file.clone(), id);
        }
        self.modules.push(LoadedModule {
            file,
            constants: module.constants,
            heap,
            start_instance: None,
        });
        Ok(id)
    }

    pub fn module(&self, id: ModuleId) -> Result<&LoadedModule, VmError> {
        self.modules
            .get(id.0)
            .ok_or_else(|| VmError::ClassNotFound(format!("<module {}>", id.0)))
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Result<&mut LoadedModule, VmError> {
        self.modules
            .get_mut(id.0)
            .ok_or_else(|| VmError::ClassNotFound(format!("<module {}>", id.0)))
    }

    /// Load `file` unless it is already cached
    pub fn ensure_file(&mut self, store: &mut Store, file: &str) -> Result<ModuleId, VmError> {
        if let Some(id) = self.files.get(file) {
            debug!(file, "module cache hit");
            return Ok(*id);
        }
        debug!(file, "loading module");
        let bytes = self.source.load(file)?;
        let module = Module::decode(&bytes)?;
        self.install(store, Some(file.to_string()), module)
    }

    /// Look up a class by qualified name, loading its module if needed
    pub fn resolve(&mut self, store: &mut Store, name: &str) -> Result<Rc<Class>, VmError> {
        if let Some(class) = self.classes.get(name) {
            return Ok(Rc::clone(class));
        }
        if name.starts_with('~') {
            let (file, _) = split_qualified(name)?;
            self.ensure_file(store, file)?;
            if let Some(class) = self.classes.get(name) {
                return Ok(Rc::clone(class));
            }
        }
        Err(VmError::ClassNotFound(name.to_string()))
    }

    /// The implicit top-level class of a module
    pub fn start_class(&mut self, store: &mut Store, module: ModuleId) -> Result<Rc<Class>, VmError> {
        let name = self.module(module)?.qualify(START_CLASS);
        self.resolve(store, &name)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn is_loaded(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }
}
