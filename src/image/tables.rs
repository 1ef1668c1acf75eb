//! Row-size calculation for the metadata tables of the `#~` stream.
//!
//! Rows are not decoded here. The table stream stores all tables back to back, so reaching the
//! `MethodDef` and `FieldRVA` rows (whose first column is an RVA) requires the row size of every
//! table stored before them. Row sizes depend on the heap index widths and on the row counts of the
//! tables that simple and coded indexes point into (ECMA-335 II.24.2.6).

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    file::{io::read_le_at, parser::Parser},
    Error::OutOfBounds,
    Result,
};

/// Identifier of a metadata table, equal to its bit in the present-table vector.
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash)]
pub enum TableId {
    /// `Module` table
    Module = 0x00,
    /// `TypeRef` table
    TypeRef = 0x01,
    /// `TypeDef` table
    TypeDef = 0x02,
    /// `FieldPtr` table (uncompressed streams only)
    FieldPtr = 0x03,
    /// `Field` table
    Field = 0x04,
    /// `MethodPtr` table (uncompressed streams only)
    MethodPtr = 0x05,
    /// `MethodDef` table
    MethodDef = 0x06,
    /// `ParamPtr` table (uncompressed streams only)
    ParamPtr = 0x07,
    /// `Param` table
    Param = 0x08,
    /// `InterfaceImpl` table
    InterfaceImpl = 0x09,
    /// `MemberRef` table
    MemberRef = 0x0A,
    /// `Constant` table
    Constant = 0x0B,
    /// `CustomAttribute` table
    CustomAttribute = 0x0C,
    /// `FieldMarshal` table
    FieldMarshal = 0x0D,
    /// `DeclSecurity` table
    DeclSecurity = 0x0E,
    /// `ClassLayout` table
    ClassLayout = 0x0F,
    /// `FieldLayout` table
    FieldLayout = 0x10,
    /// `StandAloneSig` table
    StandAloneSig = 0x11,
    /// `EventMap` table
    EventMap = 0x12,
    /// `EventPtr` table (uncompressed streams only)
    EventPtr = 0x13,
    /// `Event` table
    Event = 0x14,
    /// `PropertyMap` table
    PropertyMap = 0x15,
    /// `PropertyPtr` table (uncompressed streams only)
    PropertyPtr = 0x16,
    /// `Property` table
    Property = 0x17,
    /// `MethodSemantics` table
    MethodSemantics = 0x18,
    /// `MethodImpl` table
    MethodImpl = 0x19,
    /// `ModuleRef` table
    ModuleRef = 0x1A,
    /// `TypeSpec` table
    TypeSpec = 0x1B,
    /// `ImplMap` table
    ImplMap = 0x1C,
    /// `FieldRVA` table
    FieldRVA = 0x1D,
    /// `EncLog` table
    EncLog = 0x1E,
    /// `EncMap` table
    EncMap = 0x1F,
    /// `Assembly` table
    Assembly = 0x20,
    /// `AssemblyProcessor` table
    AssemblyProcessor = 0x21,
    /// `AssemblyOS` table
    AssemblyOS = 0x22,
    /// `AssemblyRef` table
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor` table
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS` table
    AssemblyRefOS = 0x25,
    /// `File` table
    File = 0x26,
    /// `ExportedType` table
    ExportedType = 0x27,
    /// `ManifestResource` table
    ManifestResource = 0x28,
    /// `NestedClass` table
    NestedClass = 0x29,
    /// `GenericParam` table
    GenericParam = 0x2A,
    /// `MethodSpec` table
    MethodSpec = 0x2B,
    /// `GenericParamConstraint` table
    GenericParamConstraint = 0x2C,
}

/// The kinds of coded indexes, each able to point into one of several tables.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param` or `Property`
    HasConstant,
    /// Any table that can own a custom attribute
    HasCustomAttribute,
    /// `Field` or `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// Parent of a `MemberRef`
    MemberRefParent,
    /// `Event` or `Property`
    HasSemantics,
    /// `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// `Field` or `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// Constructor of a custom attribute
    CustomAttributeType,
    /// Resolution scope of a `TypeRef`
    ResolutionScope,
    /// `TypeDef` or `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// The tables this coded index can point into, in tag order
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // Tags 0, 1 and 4 are unused; only their count matters for the tag width
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Number of low bits used for the tag
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let count = self.tables().len();
        usize::BITS - (count - 1).leading_zeros()
    }
}

/// A single column of a table row.
#[derive(Clone, Copy)]
enum Column {
    /// Constant-width value
    Fixed(usize),
    /// Index into `#Strings`
    String,
    /// Index into `#GUID`
    Guid,
    /// Index into `#Blob`
    Blob,
    /// Simple index into another table
    Index(TableId),
    /// Coded index
    Coded(CodedIndexType),
}

impl TableId {
    fn columns(self) -> &'static [Column] {
        use CodedIndexType as C;
        use Column::{Blob, Coded, Fixed, Guid, Index, String};

        match self {
            TableId::Module => &[Fixed(2), String, Guid, Guid, Guid],
            TableId::TypeRef => &[Coded(C::ResolutionScope), String, String],
            TableId::TypeDef => &[
                Fixed(4),
                String,
                String,
                Coded(C::TypeDefOrRef),
                Index(TableId::Field),
                Index(TableId::MethodDef),
            ],
            TableId::FieldPtr => &[Index(TableId::Field)],
            TableId::Field => &[Fixed(2), String, Blob],
            TableId::MethodPtr => &[Index(TableId::MethodDef)],
            TableId::MethodDef => &[
                Fixed(4),
                Fixed(2),
                Fixed(2),
                String,
                Blob,
                Index(TableId::Param),
            ],
            TableId::ParamPtr => &[Index(TableId::Param)],
            TableId::Param => &[Fixed(2), Fixed(2), String],
            TableId::InterfaceImpl => &[Index(TableId::TypeDef), Coded(C::TypeDefOrRef)],
            TableId::MemberRef => &[Coded(C::MemberRefParent), String, Blob],
            TableId::Constant => &[Fixed(1), Fixed(1), Coded(C::HasConstant), Blob],
            TableId::CustomAttribute => &[
                Coded(C::HasCustomAttribute),
                Coded(C::CustomAttributeType),
                Blob,
            ],
            TableId::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
            TableId::DeclSecurity => &[Fixed(2), Coded(C::HasDeclSecurity), Blob],
            TableId::ClassLayout => &[Fixed(2), Fixed(4), Index(TableId::TypeDef)],
            TableId::FieldLayout => &[Fixed(4), Index(TableId::Field)],
            TableId::StandAloneSig => &[Blob],
            TableId::EventMap => &[Index(TableId::TypeDef), Index(TableId::Event)],
            TableId::EventPtr => &[Index(TableId::Event)],
            TableId::Event => &[Fixed(2), String, Coded(C::TypeDefOrRef)],
            TableId::PropertyMap => &[Index(TableId::TypeDef), Index(TableId::Property)],
            TableId::PropertyPtr => &[Index(TableId::Property)],
            TableId::Property => &[Fixed(2), String, Blob],
            TableId::MethodSemantics => &[
                Fixed(2),
                Index(TableId::MethodDef),
                Coded(C::HasSemantics),
            ],
            TableId::MethodImpl => &[
                Index(TableId::TypeDef),
                Coded(C::MethodDefOrRef),
                Coded(C::MethodDefOrRef),
            ],
            TableId::ModuleRef => &[String],
            TableId::TypeSpec => &[Blob],
            TableId::ImplMap => &[
                Fixed(2),
                Coded(C::MemberForwarded),
                String,
                Index(TableId::ModuleRef),
            ],
            TableId::FieldRVA => &[Fixed(4), Index(TableId::Field)],
            TableId::EncLog => &[Fixed(4), Fixed(4)],
            TableId::EncMap => &[Fixed(4)],
            TableId::Assembly => &[
                Fixed(4),
                Fixed(2),
                Fixed(2),
                Fixed(2),
                Fixed(2),
                Fixed(4),
                Blob,
                String,
                String,
            ],
            TableId::AssemblyProcessor => &[Fixed(4)],
            TableId::AssemblyOS => &[Fixed(4), Fixed(4), Fixed(4)],
            TableId::AssemblyRef => &[
                Fixed(2),
                Fixed(2),
                Fixed(2),
                Fixed(2),
                Fixed(4),
                Blob,
                String,
                String,
                Blob,
            ],
            TableId::AssemblyRefProcessor => &[Fixed(4), Index(TableId::AssemblyRef)],
            TableId::AssemblyRefOS => &[
                Fixed(4),
                Fixed(4),
                Fixed(4),
                Index(TableId::AssemblyRef),
            ],
            TableId::File => &[Fixed(4), String, Blob],
            TableId::ExportedType => &[
                Fixed(4),
                Fixed(4),
                String,
                String,
                Coded(C::Implementation),
            ],
            TableId::ManifestResource => &[Fixed(4), Fixed(4), String, Coded(C::Implementation)],
            TableId::NestedClass => &[Index(TableId::TypeDef), Index(TableId::TypeDef)],
            TableId::GenericParam => &[Fixed(2), Fixed(2), Coded(C::TypeOrMethodDef), String],
            TableId::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
            TableId::GenericParamConstraint => {
                &[Index(TableId::GenericParam), Coded(C::TypeDefOrRef)]
            }
        }
    }
}

/// Row counts and index widths of a table stream.
pub(crate) struct TableInfo {
    rows: [u32; 64],
    heap_sizes: u8,
}

impl TableInfo {
    /// Read one row count for every bit set in `present_tables`; `parser` must be positioned at
    /// the first row count
    pub fn read(parser: &mut Parser, present_tables: u64, heap_sizes: u8) -> Result<TableInfo> {
        let mut rows = [0_u32; 64];
        for (bit, count) in rows.iter_mut().enumerate() {
            if present_tables & (1 << bit) != 0 {
                *count = parser.read_le::<u32>()?;
            }
        }

        Ok(TableInfo { rows, heap_sizes })
    }

    #[cfg(test)]
    pub fn new_test(valid_tables: &[(TableId, u32)], heap_sizes: u8) -> TableInfo {
        let mut rows = [0_u32; 64];
        for (table, count) in valid_tables {
            rows[*table as usize] = *count;
        }

        TableInfo { rows, heap_sizes }
    }

    /// Number of rows of `table`
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    fn heap_index_bytes(&self, flag: u8) -> usize {
        if self.heap_sizes & flag != 0 {
            4
        } else {
            2
        }
    }

    fn table_index_bytes(&self, table: TableId) -> usize {
        if self.rows(table) > u32::from(u16::MAX) {
            4
        } else {
            2
        }
    }

    fn coded_index_bytes(&self, coded_index: CodedIndexType) -> usize {
        let max_rows = coded_index
            .tables()
            .iter()
            .map(|table| self.rows(*table))
            .max()
            .unwrap_or(0);

        if u64::from(max_rows) < (1_u64 << (16 - coded_index.tag_bits())) {
            2
        } else {
            4
        }
    }

    /// Size in bytes of one row of `table`
    pub fn row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| match column {
                Column::Fixed(size) => *size,
                Column::String => self.heap_index_bytes(0x01),
                Column::Guid => self.heap_index_bytes(0x02),
                Column::Blob => self.heap_index_bytes(0x04),
                Column::Index(target) => self.table_index_bytes(*target),
                Column::Coded(coded_index) => self.coded_index_bytes(*coded_index),
            })
            .sum()
    }

    /// Offset of the first row of `table`, relative to the first row of the first table
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a table with an unknown layout precedes `table`.
    pub fn table_offset(&self, table: TableId) -> Result<usize> {
        let target = table as usize;
        if let Some(unknown) = (0..target).find(|bit| {
            self.rows[*bit] != 0 && !TableId::iter().any(|known| known as usize == *bit)
        }) {
            return Err(malformed_error!(
                "Table 0x{:02X} has an unknown row layout",
                unknown
            ));
        }

        Ok(TableId::iter()
            .take_while(|known| (*known as usize) < target)
            .map(|known| self.rows(known) as usize * self.row_size(known))
            .sum())
    }

    /// Read the leading 4-byte RVA column of every row of `table`
    ///
    /// `data` is the table stream and `tables_start` the offset of its first row.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the rows extend past the stream.
    pub fn rva_column(&self, data: &[u8], tables_start: usize, table: TableId) -> Result<Vec<u32>> {
        let row_size = self.row_size(table);
        let rows = self.rows(table) as usize;
        let mut offset = tables_start
            .checked_add(self.table_offset(table)?)
            .ok_or(OutOfBounds)?;

        let end = rows
            .checked_mul(row_size)
            .and_then(|len| len.checked_add(offset))
            .ok_or(OutOfBounds)?;
        if end > data.len() {
            return Err(OutOfBounds);
        }

        let mut rvas = Vec::with_capacity(rows);

        for _ in 0..self.rows(table) {
            let mut cursor = offset;
            rvas.push(read_le_at::<u32>(data, &mut cursor)?);
            offset += row_size;
        }

        Ok(rvas)
    }
}
