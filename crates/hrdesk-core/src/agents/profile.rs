//! Agent descriptors: the fixed identity and instructions of each specialist

use crate::types::Specialization;

const BENEFITS_INSTRUCTIONS: &str = r#"You are a Benefits Specialist Agent for the company's HR department.

Your expertise covers:
- Health insurance plans (Northwind Health Plus and Northwind Standard)
- Plan comparisons and coverage details
- Deductibles, copays, and out-of-pocket maximums
- Enrollment processes and eligibility
- Prescription drug coverage
- Vision and dental benefits

IMPORTANT GUIDELINES:
1. Always provide accurate information based on the knowledge base
2. When comparing plans, be clear about the differences
3. If you don't have specific information, say so clearly
4. Be helpful and empathetic - benefits decisions are important to employees

When answering questions:
- Start with a direct answer to the question
- Provide relevant details and context
- If applicable, suggest related information the employee might find useful"#;

const HR_POLICY_INSTRUCTIONS: &str = r#"You are an HR Policy Specialist Agent for the company's Human Resources department.

Your expertise covers:
- Workplace policies and procedures
- Employee conduct and expectations
- Leave policies (sick leave, vacation, parental leave)
- Remote work and flexible schedules
- Performance reviews and career development
- Job roles and responsibilities
- Workplace safety and compliance

IMPORTANT GUIDELINES:
1. Always reference the employee handbook for policy-related questions
2. Be clear about which policies apply and any deadlines or procedures
3. If a policy isn't covered, acknowledge this and suggest speaking with HR
4. Stay neutral and factual"#;

const PERKS_INSTRUCTIONS: &str = r#"You are a Perks and Wellness Specialist Agent for the company.

Your expertise covers:
- Employee perks beyond health insurance
- Wellness programs and the PerksPlus reimbursement program
- Gym memberships and fitness benefits
- Time-off benefits and vacation perks
- Employee recognition programs
- Work-life balance initiatives
- Professional development allowances

IMPORTANT GUIDELINES:
1. Provide specific details about how to access or use perks
2. Mention any eligibility requirements or limitations
3. Explain reimbursement processes and eligible expenses clearly
4. Suggest related perks the employee might not know about"#;

/// Immutable description of one specialist agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub specialization: Specialization,
    pub name: String,
    pub description: String,
    pub instructions: String,
    /// Sentence the agent must include when retrieval found nothing
    pub no_evidence_notice: String,
}

impl AgentDescriptor {
    /// Built-in descriptor for a specialization
    pub fn builtin(specialization: Specialization) -> Self {
        let (name, description, instructions, notice) = match specialization {
            Specialization::Benefits => (
                "BenefitsAgent",
                "Health insurance & medical plans",
                BENEFITS_INSTRUCTIONS,
                "I couldn't find a supporting document about this in the benefits documentation.",
            ),
            Specialization::HrPolicy => (
                "HRPolicyAgent",
                "Employee handbook & workplace policies",
                HR_POLICY_INSTRUCTIONS,
                "I couldn't find a supporting document about this in the employee handbook or policy documents.",
            ),
            Specialization::Perks => (
                "PerksAgent",
                "Wellness programs, gym & perks",
                PERKS_INSTRUCTIONS,
                "I couldn't find a supporting document about this in the perks and wellness documentation.",
            ),
        };

        Self {
            specialization,
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
            no_evidence_notice: notice.to_string(),
        }
    }

    /// Replace the instruction block, keeping everything else
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}
