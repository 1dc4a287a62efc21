/// AST node types for the supported ECMAScript subset.
/// The shapes mirror the ESTree specification; the external parser produces
/// them (directly or through the `estree` decoder) and the evaluator only
/// reads them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Clone, Debug)]
pub struct Program {
    pub body: Vec<Statement>,
}

/// A statement together with its source position, when the parser supplied
/// one. Positions are carried for diagnostics only and never affect
/// evaluation.
#[derive(Clone, Debug)]
pub struct Statement {
    pub kind: StatementKind,
    pub loc: Option<Position>,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Statement { kind, loc: None }
    }

    pub fn at(kind: StatementKind, loc: Option<Position>) -> Self {
        Statement { kind, loc }
    }
}

impl From<StatementKind> for Statement {
    fn from(kind: StatementKind) -> Self {
        Statement::new(kind)
    }
}

#[derive(Clone, Debug)]
pub enum StatementKind {
    Empty,
    Expression(Expression),
    Block(Vec<Statement>),
    Variable(VariableDeclaration),
    If(IfStatement),
    While(WhileStatement),
    DoWhile(DoWhileStatement),
    For(ForStatement),
    ForIn(ForInStatement),
    Return(Option<Expression>),
    Break(Option<String>),
    Continue(Option<String>),
    Throw(Expression),
    Try(TryStatement),
    Switch(SwitchStatement),
    Labeled(String, Box<Statement>),
    Debugger,
    FunctionDeclaration(FunctionDecl),
}

#[derive(Clone, Debug)]
pub struct VariableDeclaration {
    pub kind: VarKind,
    pub declarations: Vec<VariableDeclarator>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

/// Binding positions accept only plain identifiers; destructuring patterns
/// are outside the supported subset and rejected by the decoder.
#[derive(Clone, Debug)]
pub struct VariableDeclarator {
    pub name: String,
    pub init: Option<Expression>,
}

#[derive(Clone, Debug)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    This,
    Array(Vec<Option<Expression>>),
    Object(Vec<Property>),
    Function(FunctionExpr),
    ArrowFunction(ArrowFunction),
    Unary(UnaryOp, Box<Expression>),
    Typeof(Box<Expression>),
    Void(Box<Expression>),
    Delete(Box<Expression>),
    Update(UpdateOp, bool, Box<Expression>), // op, prefix, argument
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Logical(LogicalOp, Box<Expression>, Box<Expression>),
    Assign(AssignOp, Box<Expression>, Box<Expression>),
    Conditional(Box<Expression>, Box<Expression>, Box<Expression>),
    Call(Box<Expression>, Vec<Expression>),
    New(Box<Expression>, Vec<Expression>),
    Member(Box<Expression>, MemberProperty),
    Sequence(Vec<Expression>),
}

#[derive(Clone, Debug)]
pub enum MemberProperty {
    Dot(String),
    Computed(Box<Expression>),
}

#[derive(Clone, Debug)]
pub enum Literal {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    LShift,
    RShift,
    URShift,
    BitAnd,
    BitOr,
    BitXor,
    In,
    Instanceof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    LShiftAssign,
    RShiftAssign,
    URShiftAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
}

impl AssignOp {
    /// The binary operator a compound assignment applies before writing
    /// back, or `None` for plain `=`.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::ModAssign => Some(BinaryOp::Mod),
            AssignOp::LShiftAssign => Some(BinaryOp::LShift),
            AssignOp::RShiftAssign => Some(BinaryOp::RShift),
            AssignOp::URShiftAssign => Some(BinaryOp::URShift),
            AssignOp::BitAndAssign => Some(BinaryOp::BitAnd),
            AssignOp::BitOrAssign => Some(BinaryOp::BitOr),
            AssignOp::BitXorAssign => Some(BinaryOp::BitXor),
        }
    }
}

/// Object-literal entry. Only data properties are representable; accessor
/// properties (`get`/`set`) are outside the descriptor model.
#[derive(Clone, Debug)]
pub struct Property {
    pub key: PropertyKey,
    pub value: Expression,
}

#[derive(Clone, Debug)]
pub enum PropertyKey {
    Identifier(String),
    String(String),
    Number(f64),
}

#[derive(Clone, Debug)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
}

#[derive(Clone, Debug)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub struct DoWhileStatement {
    pub test: Expression,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub enum ForInit {
    Variable(VariableDeclaration),
    Expression(Expression),
}

#[derive(Clone, Debug)]
pub struct ForInStatement {
    pub left: ForInLeft,
    pub right: Expression,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub enum ForInLeft {
    Variable(VarKind, String),
    Identifier(String),
}

#[derive(Clone, Debug)]
pub struct TryStatement {
    pub block: Vec<Statement>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Vec<Statement>>,
}

#[derive(Clone, Debug)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug)]
pub struct FunctionExpr {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug)]
pub struct ArrowFunction {
    pub params: Vec<String>,
    pub body: ArrowBody,
}

#[derive(Clone, Debug)]
pub enum ArrowBody {
    Expression(Box<Expression>),
    Block(Vec<Statement>),
}

/// Small constructors used by unit tests across the crate to assemble
/// programs without going through JSON.
#[cfg(test)]
pub(crate) mod build {
    use super::*;

    pub fn num(n: f64) -> Expression {
        Expression::Literal(Literal::Number(n))
    }

    pub fn str_(s: &str) -> Expression {
        Expression::Literal(Literal::String(s.to_string()))
    }

    pub fn boolean(b: bool) -> Expression {
        Expression::Literal(Literal::Boolean(b))
    }

    pub fn ident(name: &str) -> Expression {
        Expression::Identifier(name.to_string())
    }

    pub fn binary(op: BinaryOp, l: Expression, r: Expression) -> Expression {
        Expression::Binary(op, Box::new(l), Box::new(r))
    }

    pub fn assign(target: Expression, value: Expression) -> Expression {
        Expression::Assign(AssignOp::Assign, Box::new(target), Box::new(value))
    }

    pub fn call(callee: Expression, args: Vec<Expression>) -> Expression {
        Expression::Call(Box::new(callee), args)
    }

    pub fn member(obj: Expression, name: &str) -> Expression {
        Expression::Member(Box::new(obj), MemberProperty::Dot(name.to_string()))
    }

    pub fn index(obj: Expression, key: Expression) -> Expression {
        Expression::Member(Box::new(obj), MemberProperty::Computed(Box::new(key)))
    }

    pub fn expr_stmt(e: Expression) -> Statement {
        Statement::new(StatementKind::Expression(e))
    }

    pub fn decl(kind: VarKind, name: &str, init: Option<Expression>) -> Statement {
        Statement::new(StatementKind::Variable(VariableDeclaration {
            kind,
            declarations: vec![VariableDeclarator {
                name: name.to_string(),
                init,
            }],
        }))
    }

    pub fn ret(e: Option<Expression>) -> Statement {
        Statement::new(StatementKind::Return(e))
    }

    pub fn block(body: Vec<Statement>) -> Statement {
        Statement::new(StatementKind::Block(body))
    }

    pub fn func_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
        Statement::new(StatementKind::FunctionDeclaration(FunctionDecl {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }))
    }

    pub fn func_expr(params: &[&str], body: Vec<Statement>) -> Expression {
        Expression::Function(FunctionExpr {
            name: None,
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        })
    }

    pub fn arrow(params: &[&str], body: Expression) -> Expression {
        Expression::ArrowFunction(ArrowFunction {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: ArrowBody::Expression(Box::new(body)),
        })
    }

    pub fn program(body: Vec<Statement>) -> Program {
        Program { body }
    }
}
