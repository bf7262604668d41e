//! Student (aluno) record.
//!
//! # Invariants
//! - `cpf` is stored as 11 digits, `email` lowercase; both unique.
//! - `matricula` (enrollment number) is unique and non-blank.

use crate::model::audit::AuditStamp;
use crate::model::catalog::CatalogId;
use crate::model::user::UserId;
use crate::model::validation::{
    normalize_cpf, normalize_email, optional_text, require_text, ValidationError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StudentId = Uuid;

/// Raw student fields as typed by a clerk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StudentInput {
    pub name: String,
    pub cpf: String,
    pub email: String,
    pub matricula: String,
    pub phone: Option<String>,
    pub course_id: CatalogId,
    pub admission_method_id: CatalogId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub cpf: String,
    pub email: String,
    pub matricula: String,
    pub phone: Option<String>,
    pub course_id: CatalogId,
    pub admission_method_id: CatalogId,
    pub audit: AuditStamp,
}

impl Student {
    /// Builds a new student from validated and normalized input.
    pub fn from_input(input: &StudentInput, actor: UserId) -> Result<Self, ValidationError> {
        let mut student = Self {
            id: Uuid::new_v4(),
            name: String::new(),
            cpf: String::new(),
            email: String::new(),
            matricula: String::new(),
            phone: None,
            course_id: input.course_id,
            admission_method_id: input.admission_method_id,
            audit: AuditStamp::new(Some(actor)),
        };
        student.apply(input)?;
        Ok(student)
    }

    /// Replaces all editable fields. Leaves `self` untouched on error.
    pub fn apply(&mut self, input: &StudentInput) -> Result<(), ValidationError> {
        let name = require_text("name", &input.name)?;
        let cpf = normalize_cpf(&input.cpf)?;
        let email = normalize_email(&input.email)?;
        let matricula = require_text("matricula", &input.matricula)?;

        self.name = name;
        self.cpf = cpf;
        self.email = email;
        self.matricula = matricula;
        self.phone = optional_text(input.phone.as_deref());
        self.course_id = input.course_id;
        self.admission_method_id = input.admission_method_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Student, StudentInput};
    use crate::model::validation::ValidationError;
    use uuid::Uuid;

    fn input() -> StudentInput {
        StudentInput {
            name: " Ana Souza ".to_string(),
            cpf: "529.982.247-25".to_string(),
            email: "Ana@Escola.edu.br".to_string(),
            matricula: " 2024001 ".to_string(),
            phone: Some("  ".to_string()),
            course_id: Uuid::new_v4(),
            admission_method_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn from_input_normalizes_fields() {
        let student = Student::from_input(&input(), Uuid::new_v4()).unwrap();
        assert_eq!(student.name, "Ana Souza");
        assert_eq!(student.cpf, "52998224725");
        assert_eq!(student.email, "ana@escola.edu.br");
        assert_eq!(student.matricula, "2024001");
        assert_eq!(student.phone, None);
    }

    #[test]
    fn failed_apply_keeps_previous_values() {
        let mut student = Student::from_input(&input(), Uuid::new_v4()).unwrap();
        let mut bad = input();
        bad.name = "Other".to_string();
        bad.cpf = "000".to_string();

        assert_eq!(student.apply(&bad), Err(ValidationError::InvalidCpf));
        assert_eq!(student.name, "Ana Souza");
    }
}
